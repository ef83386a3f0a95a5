use crate::k8s::cache::ResourceKind;
use derive_more::From;
use k8s_openapi::serde_json;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, From)]
pub enum Error {
    #[from]
    Json(serde_json::Error),

    #[from]
    Kube(kube::Error),

    #[from]
    Infer(kube::config::InferConfigError),

    #[from]
    Kubeconfig(kube::config::KubeconfigError),

    #[from]
    Io(std::io::Error),

    #[from]
    Csv(csv::Error),

    /// Initial listing for a kind failed, nothing cached to fall back on
    WarmUp {
        kind: ResourceKind,
        source: Box<Error>,
    },

    /// Warm-up for a kind was cancelled before its listing completed
    WarmUpCancelled(ResourceKind),

    /// Custom error message
    Custom(String),
}

impl Error {
    /// True for errors caused by a cancelled warm-up rather than a real failure
    #[must_use]
    pub const fn is_cancellation(&self) -> bool {
        matches!(self, Self::WarmUpCancelled(_))
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, fmt: &mut core::fmt::Formatter) -> core::result::Result<(), core::fmt::Error> {
        write!(fmt, "{self:?}")
    }
}

impl std::error::Error for Error {}
