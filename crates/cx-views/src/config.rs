//! View defaults

use serde::{Deserialize, Serialize};

/// Defaults applied when a description leaves a view option unset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewOptions {
    /// Colormap for slots whose view lists none
    #[serde(default = "default_colormap")]
    pub default_colormap: String,

    /// Colormap given to both slots of a combined view
    #[serde(default = "default_bivariate_colormap")]
    pub default_bivariate_colormap: String,

    /// Draw voxel boundaries on volume views
    #[serde(default)]
    pub voxlines: bool,
}

fn default_colormap() -> String {
    "RdBu_r".to_string()
}

fn default_bivariate_colormap() -> String {
    "RdBu_covar".to_string()
}

impl Default for ViewOptions {
    fn default() -> Self {
        Self {
            default_colormap: default_colormap(),
            default_bivariate_colormap: default_bivariate_colormap(),
            voxlines: false,
        }
    }
}
