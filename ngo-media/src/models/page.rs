//! Site pages and gallery categories

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::MediaError;

/// Every page of the public site, image-bearing or not
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Page {
    Home,
    About,
    Programs,
    GetInvolved,
    Gallery,
    Contact,
    Donate,
}

impl Page {
    pub const ALL: [Page; 7] = [
        Page::Home,
        Page::About,
        Page::Programs,
        Page::GetInvolved,
        Page::Gallery,
        Page::Contact,
        Page::Donate,
    ];

    /// Wire/storage name
    pub fn as_str(&self) -> &'static str {
        match self {
            Page::Home => "home",
            Page::About => "about",
            Page::Programs => "programs",
            Page::GetInvolved => "get-involved",
            Page::Gallery => "gallery",
            Page::Contact => "contact",
            Page::Donate => "donate",
        }
    }
}

impl fmt::Display for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Page {
    type Err = MediaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Page::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == wanted)
            .ok_or_else(|| MediaError::Validation(format!("Unknown page: '{}'", s)))
    }
}

/// Content category partitioning the gallery's slots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    EventsActivities,
    CommunityWork,
    Education,
    Awareness,
    General,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::EventsActivities,
        Category::CommunityWork,
        Category::Education,
        Category::Awareness,
        Category::General,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::EventsActivities => "events-activities",
            Category::CommunityWork => "community-work",
            Category::Education => "education",
            Category::Awareness => "awareness",
            Category::General => "general",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = MediaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Category::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == wanted)
            .ok_or_else(|| MediaError::Validation(format!("Unknown category: '{}'", s)))
    }
}
