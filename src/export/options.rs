use crate::foundation::core::PageSelection;
use crate::foundation::error::{FolioError, FolioResult};
use serde::{Deserialize, Serialize};

/// Export quality levels. Each tier is a fixed target DPI; print tiers may
/// additionally request CMYK output.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityTier {
    Preview,
    #[default]
    Medium,
    Printing,
    Excellent,
}

impl QualityTier {
    pub fn dpi(self) -> u32 {
        match self {
            Self::Preview => 72,
            Self::Medium => 150,
            Self::Printing => 300,
            Self::Excellent => 600,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Preview => "preview",
            Self::Medium => "medium",
            Self::Printing => "printing",
            Self::Excellent => "excellent",
        }
    }
}

/// Role of the requesting user, as the auth layer reports it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Author,
    Publisher,
    Owner,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PdfExportOptions {
    #[serde(default)]
    pub quality: QualityTier,
    #[serde(default)]
    pub pages: PageSelection,
    #[serde(default)]
    pub cmyk: bool,
    #[serde(default)]
    pub icc_profile: Option<String>,
}

/// Business rule enforced before any rendering work begins: printing-tier
/// quality is not available to authors. Fails fast, no job is created.
pub fn check_export_policy(role: UserRole, options: &PdfExportOptions) -> FolioResult<()> {
    if options.quality == QualityTier::Printing && role == UserRole::Author {
        return Err(FolioError::policy(
            "printing quality is not available to the author role",
        ));
    }
    Ok(())
}
