use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Theme {
    pub id: i64,
    pub name: String,
    pub thesis: Option<String>,
    pub status: ThemeStatus,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ThemeStatus {
    Active,
    Watching,
    Archived,
}

impl ThemeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Watching => "watching",
            Self::Archived => "archived",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "watching" => Some(Self::Watching),
            "archived" => Some(Self::Archived),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThemeWithStocks {
    #[serde(flatten)]
    pub theme: Theme,
    pub stocks: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateThemeInput {
    pub name: String,
    pub thesis: Option<String>,
    pub status: Option<ThemeStatus>,
    #[serde(default)]
    pub stocks: Vec<String>,
}
