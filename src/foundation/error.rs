pub type FolioResult<T> = Result<T, FolioError>;

/// Error taxonomy for the composition and export engine.
///
/// `Policy` is rejected before any rendering work starts; `Resource` is fatal
/// to a whole export job; everything per-element degrades locally and never
/// surfaces here (see the snapshot and headless renderer modules).
#[derive(thiserror::Error, Debug)]
pub enum FolioError {
    #[error("policy violation: {0}")]
    Policy(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("layout error: {0}")]
    Layout(String),

    #[error("render error: {0}")]
    Render(String),

    #[error("resource error: {0}")]
    Resource(String),

    #[error("pdf error: {0}")]
    Pdf(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl FolioError {
    pub fn policy(msg: impl Into<String>) -> Self {
        Self::Policy(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn layout(msg: impl Into<String>) -> Self {
        Self::Layout(msg.into())
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render(msg.into())
    }

    pub fn resource(msg: impl Into<String>) -> Self {
        Self::Resource(msg.into())
    }

    pub fn pdf(msg: impl Into<String>) -> Self {
        Self::Pdf(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_are_stable() {
        assert!(
            FolioError::policy("x").to_string().contains("policy violation:")
        );
        assert!(
            FolioError::validation("x")
                .to_string()
                .contains("validation error:")
        );
        assert!(FolioError::render("x").to_string().contains("render error:"));
        assert!(FolioError::pdf("x").to_string().contains("pdf error:"));
    }

    #[test]
    fn other_preserves_source() {
        let base = std::io::Error::other("boom");
        let err = FolioError::Other(anyhow::Error::new(base));
        assert!(err.to_string().contains("boom"));
    }
}
