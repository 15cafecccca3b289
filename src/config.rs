//! Render configuration.
//!
//! All renderer behaviour is controlled through [`RenderConfig`], built via
//! its [`RenderConfigBuilder`]. Keeping every knob in one immutable struct
//! makes renders freely shareable across tasks — nothing here mutates after
//! `build()`, which is what allows renders for different cases to run
//! fully concurrently without locking.

use crate::classify::ClassificationTables;
use crate::error::RenderError;
use crate::layout::Variant;
use chrono::NaiveDate;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for consent-form rendering.
///
/// Built via [`RenderConfig::builder()`]. Template **bytes** take
/// precedence over template **paths**; tests inject bytes, deployments
/// configure paths.
///
/// # Example
/// ```rust,no_run
/// use cplp_formfill::RenderConfig;
///
/// let config = RenderConfig::builder()
///     .adult_template_path("templates/consentimento_adulto.pdf")
///     .minor_template_path("templates/consentimento_menor.pdf")
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Blank adult consent template on disk.
    pub adult_template_path: Option<PathBuf>,
    /// Blank minor consent template on disk.
    pub minor_template_path: Option<PathBuf>,
    /// In-memory adult template; wins over the path when set.
    pub adult_template_bytes: Option<Vec<u8>>,
    /// In-memory minor template; wins over the path when set.
    pub minor_template_bytes: Option<Vec<u8>>,

    /// Per-signature-strategy deadline. Default: 4s.
    ///
    /// A slow strategy degrades to "failed" and the chain advances; it
    /// must never stall the whole render.
    pub strategy_timeout: Duration,

    /// Frozen clock for the "today" line. `None` means wall clock.
    ///
    /// The today field is the only wall-clock-dependent value in a
    /// render; freezing it makes output byte-identical across runs,
    /// which the idempotence tests rely on.
    pub today: Option<NaiveDate>,

    /// Font size for overlaid field text, in points. Default: 10.
    pub font_size: f32,

    /// Category lookup tables for classification.
    pub classification: ClassificationTables,

    /// Root of the scoped local signature store, where deployed.
    pub local_signature_root: Option<PathBuf>,

    /// Static-asset origin for the last-resort signature strategy.
    pub asset_base_url: Option<String>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            adult_template_path: None,
            minor_template_path: None,
            adult_template_bytes: None,
            minor_template_bytes: None,
            strategy_timeout: Duration::from_secs(4),
            today: None,
            font_size: 10.0,
            classification: ClassificationTables::default(),
            local_signature_root: None,
            asset_base_url: None,
        }
    }
}

impl RenderConfig {
    pub fn builder() -> RenderConfigBuilder {
        RenderConfigBuilder {
            config: Self::default(),
        }
    }

    /// Configured template path for a variant, if any.
    pub fn template_path(&self, variant: Variant) -> Option<&PathBuf> {
        match variant {
            Variant::Adult => self.adult_template_path.as_ref(),
            Variant::Minor => self.minor_template_path.as_ref(),
        }
    }

    /// Configured in-memory template for a variant, if any.
    pub fn template_bytes(&self, variant: Variant) -> Option<&[u8]> {
        match variant {
            Variant::Adult => self.adult_template_bytes.as_deref(),
            Variant::Minor => self.minor_template_bytes.as_deref(),
        }
    }
}

/// Builder for [`RenderConfig`].
#[derive(Debug)]
pub struct RenderConfigBuilder {
    config: RenderConfig,
}

impl RenderConfigBuilder {
    pub fn adult_template_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.adult_template_path = Some(path.into());
        self
    }

    pub fn minor_template_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.minor_template_path = Some(path.into());
        self
    }

    pub fn adult_template_bytes(mut self, bytes: Vec<u8>) -> Self {
        self.config.adult_template_bytes = Some(bytes);
        self
    }

    pub fn minor_template_bytes(mut self, bytes: Vec<u8>) -> Self {
        self.config.minor_template_bytes = Some(bytes);
        self
    }

    pub fn strategy_timeout(mut self, timeout: Duration) -> Self {
        self.config.strategy_timeout = timeout.max(Duration::from_millis(100));
        self
    }

    pub fn today(mut self, date: NaiveDate) -> Self {
        self.config.today = Some(date);
        self
    }

    pub fn font_size(mut self, pt: f32) -> Self {
        self.config.font_size = pt.clamp(6.0, 24.0);
        self
    }

    pub fn classification(mut self, tables: ClassificationTables) -> Self {
        self.config.classification = tables;
        self
    }

    pub fn local_signature_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.local_signature_root = Some(root.into());
        self
    }

    pub fn asset_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.asset_base_url = Some(url.into());
        self
    }

    /// Build the configuration, validating that at least one variant has
    /// a template source. An entirely template-less config can only ever
    /// produce [`RenderError::TemplateMissing`], so it is rejected here
    /// where the deployment mistake is cheapest to spot.
    pub fn build(self) -> Result<RenderConfig, RenderError> {
        let c = &self.config;
        let has_any = c.adult_template_path.is_some()
            || c.minor_template_path.is_some()
            || c.adult_template_bytes.is_some()
            || c.minor_template_bytes.is_some();
        if !has_any {
            return Err(RenderError::TemplateMissing {
                variant: Variant::Adult,
                path: None,
            });
        }
        Ok(self.config)
    }
}
