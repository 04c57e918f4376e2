use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Listening period accepted by `user.getTopAlbums`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Period {
    #[default]
    #[serde(rename = "overall")]
    Overall,
    #[serde(rename = "7day")]
    SevenDays,
    #[serde(rename = "1month")]
    OneMonth,
    #[serde(rename = "3month")]
    ThreeMonths,
    #[serde(rename = "6month")]
    SixMonths,
    #[serde(rename = "12month")]
    TwelveMonths,
}

impl Period {
    pub const ALL: [Period; 6] = [
        Period::Overall,
        Period::SevenDays,
        Period::OneMonth,
        Period::ThreeMonths,
        Period::SixMonths,
        Period::TwelveMonths,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Period::Overall => "overall",
            Period::SevenDays => "7day",
            Period::OneMonth => "1month",
            Period::ThreeMonths => "3month",
            Period::SixMonths => "6month",
            Period::TwelveMonths => "12month",
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Period {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Period::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| format!("unknown period `{s}`"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopAlbumsResponse {
    pub topalbums: TopAlbums,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopAlbums {
    #[serde(default)]
    pub album: Vec<Album>,
    #[serde(rename = "@attr", default, skip_serializing_if = "Option::is_none")]
    pub attr: Option<TopAlbumsAttr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopAlbumsAttr {
    pub user: String,
    pub page: String,
    pub total_pages: String,
    pub per_page: String,
    pub total: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Album {
    pub artist: Artist,
    #[serde(default)]
    pub image: Vec<AlbumImage>,
    #[serde(default)]
    pub mbid: String,
    pub url: String,
    pub playcount: String,
    #[serde(rename = "@attr")]
    pub attr: AlbumRank,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artist {
    pub url: String,
    pub name: String,
    #[serde(default)]
    pub mbid: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlbumRank {
    pub rank: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlbumImage {
    pub size: ImageSize,
    #[serde(rename = "#text")]
    pub url: String,
}

/// Ordered smallest to largest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageSize {
    Small = 1,
    Medium = 2,
    Large = 3,
    Extralarge = 4,
    Mega = 5,
    // Declared last for `#[serde(other)]`; the discriminant keeps it smallest.
    #[serde(other)]
    Unknown = 0,
}

impl Album {
    pub fn rank(&self) -> Option<u32> {
        self.attr.rank.parse().ok()
    }

    /// URL of the largest non-empty artwork image.
    pub fn largest_image(&self) -> Option<&str> {
        self.image
            .iter()
            .filter(|img| !img.url.is_empty())
            .max_by_key(|img| img.size)
            .map(|img| img.url.as_str())
    }

    pub fn display_name(&self) -> String {
        format!("{} - {}", self.artist.name, self.name)
    }
}
