use serde::{Deserialize, Serialize};

/// Membership role a user registers under. Determines the initial credit
/// allotment and whether the user may start video meetings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Investor,
    Freelancer,
    Professional,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Investor => "investor",
            Self::Freelancer => "freelancer",
            Self::Professional => "professional",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "investor" => Some(Self::Investor),
            "freelancer" => Some(Self::Freelancer),
            "professional" => Some(Self::Professional),
            _ => None,
        }
    }

    /// Credits granted when an account is created:
    /// (connect, invite, bid).
    pub fn initial_credits(&self) -> (i64, i64, i64) {
        match self {
            Self::Investor => (10, 5, 20),
            Self::Freelancer => (15, 3, 30),
            Self::Professional => (20, 5, 50),
        }
    }

    /// Only investors may start video meetings.
    pub fn can_start_meetings(&self) -> bool {
        matches!(self, Self::Investor)
    }
}

/// Lifecycle of a connection request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Pending,
    Accepted,
    Rejected,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "accepted" => Some(Self::Accepted),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}
