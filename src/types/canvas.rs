use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

macro_rules! string_id {
    ($name:ident, $prefix:literal) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Fresh session-unique id: prefix + ULID (time-ordered, random tail).
            pub fn generate() -> Self {
                Self(format!(concat!($prefix, "_{}"), ulid::Ulid::new()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(ImageId, "img");
string_id!(LayerId, "layer");

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CanvasSize {
    pub width: u32,
    pub height: u32,
}

impl Default for CanvasSize {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dx: f64, dy: f64) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PatternRepeat {
    #[default]
    #[serde(rename = "repeat")]
    Repeat,
    #[serde(rename = "repeat-x")]
    RepeatX,
    #[serde(rename = "repeat-y")]
    RepeatY,
    #[serde(rename = "no-repeat")]
    NoRepeat,
}

/// Pattern fill drawn behind an image, tiled from another placed image's bitmap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FillPattern {
    pub image_id: ImageId,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default)]
    pub repeat: PatternRepeat,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageStyle {
    pub scale: f64,
    /// Degrees, clockwise.
    pub rotation: f64,
    pub opacity: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill_image: Option<FillPattern>,
}

impl Default for ImageStyle {
    fn default() -> Self {
        Self {
            scale: 1.0,
            rotation: 0.0,
            opacity: 1.0,
            fill: None,
            fill_image: None,
        }
    }
}

/// Serializable state of a placed image, without its bitmap.
/// This is what gets written to the durable store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageSnapshot {
    pub id: ImageId,
    pub name: String,
    pub layer_id: LayerId,
    pub pos: Position,
    pub style: ImageStyle,
}

/// Field-level style patch. Absent fields keep their current value;
/// `fill`/`fill_image` distinguish "absent" from an explicit `null` (clear).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StylePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opacity: Option<f64>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub fill: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub fill_image: Option<Option<FillPattern>>,
}

impl StylePatch {
    /// Apply onto `style`. Non-finite numbers and non-positive scales are ignored,
    /// opacity is clamped to [0, 1].
    pub fn apply(&self, style: &mut ImageStyle) {
        if let Some(scale) = self.scale.filter(|s| s.is_finite() && *s > 0.0) {
            style.scale = scale;
        }
        if let Some(rotation) = self.rotation.filter(|r| r.is_finite()) {
            style.rotation = rotation;
        }
        if let Some(opacity) = self.opacity.filter(|o| !o.is_nan()) {
            style.opacity = opacity.clamp(0.0, 1.0);
        }
        if let Some(fill) = &self.fill {
            style.fill = fill.clone();
        }
        if let Some(fill_image) = &self.fill_image {
            style.fill_image = fill_image.clone();
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImagePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pos: Option<Position>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<StylePatch>,
}

/// Desired layer properties; absent fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct LayerPatch {
    pub name: Option<String>,
    pub visible: Option<bool>,
    pub locked: Option<bool>,
    pub opacity: Option<f64>,
}

/// Partial transform applied to the selected image (drag / transformer end).
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
pub struct Transform {
    #[serde(default)]
    pub scale: Option<f64>,
    #[serde(default)]
    pub rotation: Option<f64>,
    #[serde(default)]
    pub opacity: Option<f64>,
    #[serde(default)]
    pub position: Option<Position>,
}

impl Transform {
    pub fn into_patch(self) -> ImagePatch {
        ImagePatch {
            name: None,
            pos: self.position,
            style: Some(StylePatch {
                scale: self.scale,
                rotation: self.rotation,
                opacity: self.opacity,
                ..StylePatch::default()
            }),
        }
    }
}

/// Everything needed to place a new image except its bitmap.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewImage {
    pub name: String,
    /// Defaults to the selected layer.
    #[serde(default)]
    pub layer_id: Option<LayerId>,
    #[serde(default)]
    pub pos: Position,
    /// Merged over the default style.
    #[serde(default)]
    pub style: Option<StylePatch>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZOrder {
    Front,
    Back,
    Up,
    Down,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct KeyPress {
    pub key: String,
    #[serde(default)]
    pub ctrl: bool,
    #[serde(default)]
    pub meta: bool,
}

fn double_option<'de, T, D>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(de).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn style_patch_keeps_unspecified_fields() {
        let mut style = ImageStyle {
            scale: 2.0,
            rotation: 45.0,
            opacity: 0.5,
            fill: Some("#ff0000".to_string()),
            fill_image: None,
        };
        let patch: StylePatch = serde_json::from_str(r#"{"rotation": 90}"#).unwrap();
        patch.apply(&mut style);
        assert_eq!(style.rotation, 90.0);
        assert_eq!(style.scale, 2.0);
        assert_eq!(style.opacity, 0.5);
        assert_eq!(style.fill.as_deref(), Some("#ff0000"));
    }

    #[test]
    fn explicit_null_clears_fill() {
        let mut style = ImageStyle {
            fill: Some("#00ff00".to_string()),
            ..ImageStyle::default()
        };
        let patch: StylePatch = serde_json::from_str(r#"{"fill": null}"#).unwrap();
        assert_eq!(patch.fill, Some(None));
        patch.apply(&mut style);
        assert_eq!(style.fill, None);
    }

    #[test]
    fn opacity_is_clamped_and_bad_scale_ignored() {
        let mut style = ImageStyle::default();
        StylePatch {
            opacity: Some(3.0),
            scale: Some(-1.0),
            ..StylePatch::default()
        }
        .apply(&mut style);
        assert_eq!(style.opacity, 1.0);
        assert_eq!(style.scale, 1.0);
    }

    #[test]
    fn generated_ids_are_prefixed_and_unique() {
        let a = ImageId::generate();
        let b = ImageId::generate();
        assert!(a.as_str().starts_with("img_"));
        assert!(LayerId::generate().as_str().starts_with("layer_"));
        assert_ne!(a, b);
    }

    #[test]
    fn pattern_repeat_uses_css_names() {
        let repeat: PatternRepeat = serde_json::from_str(r#""no-repeat""#).unwrap();
        assert_eq!(repeat, PatternRepeat::NoRepeat);
        assert_eq!(
            serde_json::to_string(&PatternRepeat::RepeatX).unwrap(),
            r#""repeat-x""#
        );
    }
}
