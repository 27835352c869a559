//! Prospect contact data

use crate::Result;
use anyhow::bail;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Regex pattern for a five-digit US zip code
static ZIP_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{5}$").expect("Invalid zip regex"));

/// Contact data for one submission run. Immutable once handed to the
/// orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prospect {
    pub full_name: String,
    pub phone: String,
    pub zip: String,
}

impl Prospect {
    pub fn new(full_name: &str, phone: &str, zip: &str) -> Self {
        Self {
            full_name: full_name.trim().to_string(),
            phone: phone.trim().to_string(),
            zip: zip.trim().to_string(),
        }
    }

    /// Validate before orchestration: every field present, the full name has
    /// both a first and a last token, the zip is five digits. Failing
    /// validation short-circuits before any attempt is made.
    pub fn validate(&self) -> Result<()> {
        if self.full_name.is_empty() || self.phone.is_empty() || self.zip.is_empty() {
            bail!("full name, phone, and zip code are all required");
        }
        if self.full_name.split_whitespace().count() < 2 {
            bail!("full name must include both first and last name");
        }
        if !ZIP_REGEX.is_match(&self.zip) {
            bail!("zip code must be exactly five digits");
        }
        Ok(())
    }
}
