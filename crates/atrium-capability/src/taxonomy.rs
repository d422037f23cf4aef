use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
/// Enumerates supported `CapabilityDomain` values.
pub enum CapabilityDomain {
    Network,
    Storage,
    Agent,
    Notifications,
    Media,
    System,
}

impl CapabilityDomain {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Storage => "storage",
            Self::Agent => "agent",
            Self::Notifications => "notifications",
            Self::Media => "media",
            Self::System => "system",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
/// Enumerates supported `RiskTier` values.
pub enum RiskTier {
    Low,
    Medium,
    High,
}

impl RiskTier {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// One entry of the fixed capability taxonomy.
pub struct Capability {
    pub tag: &'static str,
    pub domain: CapabilityDomain,
    pub label: &'static str,
    pub description: &'static str,
    pub risk: RiskTier,
}

/// The fixed capability taxonomy. Order is stable and part of the public
/// surface consumed by consent UI.
const CAPABILITIES: &[Capability] = &[
    Capability {
        tag: "network:http",
        domain: CapabilityDomain::Network,
        label: "HTTP requests",
        description: "Fetch data from external web services",
        risk: RiskTier::Medium,
    },
    Capability {
        tag: "network:websocket",
        domain: CapabilityDomain::Network,
        label: "Live connections",
        description: "Hold open streaming connections to external services",
        risk: RiskTier::Medium,
    },
    Capability {
        tag: "storage:local",
        domain: CapabilityDomain::Storage,
        label: "Local storage",
        description: "Persist small key/value data scoped to the app",
        risk: RiskTier::Low,
    },
    Capability {
        tag: "storage:indexed",
        domain: CapabilityDomain::Storage,
        label: "Structured storage",
        description: "Persist structured collections scoped to the app",
        risk: RiskTier::Low,
    },
    Capability {
        tag: "storage:files",
        domain: CapabilityDomain::Storage,
        label: "File access",
        description: "Read and write files chosen by the user",
        risk: RiskTier::High,
    },
    Capability {
        tag: "agent:query",
        domain: CapabilityDomain::Agent,
        label: "Agent queries",
        description: "Send requests to the platform's AI agent",
        risk: RiskTier::High,
    },
    Capability {
        tag: "agent:context",
        domain: CapabilityDomain::Agent,
        label: "Agent context",
        description: "Contribute context hints to agent conversations",
        risk: RiskTier::Medium,
    },
    Capability {
        tag: "notifications:toast",
        domain: CapabilityDomain::Notifications,
        label: "Toast notifications",
        description: "Show transient in-shell notifications",
        risk: RiskTier::Low,
    },
    Capability {
        tag: "notifications:system",
        domain: CapabilityDomain::Notifications,
        label: "System notifications",
        description: "Post notifications outside the shell",
        risk: RiskTier::Medium,
    },
    Capability {
        tag: "media:camera",
        domain: CapabilityDomain::Media,
        label: "Camera",
        description: "Capture video from the camera",
        risk: RiskTier::High,
    },
    Capability {
        tag: "media:microphone",
        domain: CapabilityDomain::Media,
        label: "Microphone",
        description: "Capture audio from the microphone",
        risk: RiskTier::High,
    },
    Capability {
        tag: "media:screen",
        domain: CapabilityDomain::Media,
        label: "Screen capture",
        description: "Capture the contents of the screen",
        risk: RiskTier::High,
    },
    Capability {
        tag: "system:clipboard",
        domain: CapabilityDomain::System,
        label: "Clipboard",
        description: "Read from and write to the shared clipboard",
        risk: RiskTier::Medium,
    },
    Capability {
        tag: "system:fullscreen",
        domain: CapabilityDomain::System,
        label: "Fullscreen",
        description: "Expand the app panel to fill the shell",
        risk: RiskTier::Low,
    },
    Capability {
        tag: "system:shell",
        domain: CapabilityDomain::System,
        label: "Shell commands",
        description: "Run commands in the host environment",
        risk: RiskTier::High,
    },
];

/// Universally-safe capabilities that bypass the ledger: every app holds
/// these regardless of its grant records.
pub const ALWAYS_GRANTED_CAPABILITIES: &[&str] = &[
    "storage:local",
    "storage:indexed",
    "notifications:toast",
    "system:fullscreen",
];

/// Returns the full fixed taxonomy in declaration order.
pub fn all_capabilities() -> &'static [Capability] {
    CAPABILITIES
}

/// Looks up one capability descriptor by tag.
pub fn find_capability(tag: &str) -> Option<&'static Capability> {
    CAPABILITIES.iter().find(|capability| capability.tag == tag)
}

/// Returns true when the capability bypasses the ledger entirely.
pub fn is_always_granted(tag: &str) -> bool {
    ALWAYS_GRANTED_CAPABILITIES.contains(&tag)
}
