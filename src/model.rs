use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DefaultOnNull};
use time::OffsetDateTime;

/// One scheduled launch as served by the upcoming-launches endpoint.
///
/// Free-text fields the upstream sometimes sends as `null` decode to `""`.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchRecord {
    pub id: String,
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    pub url: String,
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub image: Option<String>,
    /// No Earlier Than.
    #[serde(with = "time::serde::rfc3339")]
    pub net: OffsetDateTime,
    #[serde(default)]
    pub mission: Option<Mission>,
    #[serde(default)]
    pub pad: Option<Pad>,
    #[serde(default, rename = "launch_service_provider")]
    pub provider: Option<Agency>,
    pub status: LaunchStatus,
    #[serde(default, rename = "infoURLs")]
    pub info_url: Option<String>,
    #[serde(default, rename = "vidURLs")]
    pub video_url: Option<String>,
}

impl LaunchRecord {
    pub fn mission_name(&self) -> Option<&str> {
        self.mission.as_ref().map(|mission| mission.name.as_str())
    }
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mission {
    pub id: String,
    pub name: String,
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    pub description: String,
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pad {
    pub id: String,
    pub name: String,
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    pub latitude: String,
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    pub longitude: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agency {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchStatus {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpcomingPage {
    pub count: usize,
    pub results: Vec<LaunchRecord>,
}
