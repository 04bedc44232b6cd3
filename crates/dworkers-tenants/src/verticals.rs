use dworkers_core::{DworkersError, DworkersResult};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// An industry context that shapes worker instructions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerticalConfig {
    /// Lookup key, e.g. `banking`.
    pub name: String,
    /// Human-readable name.
    pub display_name: String,
    /// Topics workers should emphasise.
    pub focus_areas: Vec<String>,
    /// Appended to every worker's system instructions for tenants in this vertical.
    pub system_prompt_fragment: String,
    /// Terms associated with the vertical.
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl VerticalConfig {
    fn new(
        name: &str,
        display_name: &str,
        focus_areas: &[&str],
        system_prompt_fragment: &str,
        keywords: &[&str],
    ) -> Self {
        Self {
            name: name.to_string(),
            display_name: display_name.to_string(),
            focus_areas: focus_areas.iter().map(|s| s.to_string()).collect(),
            system_prompt_fragment: system_prompt_fragment.to_string(),
            keywords: keywords.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Name → vertical lookup.
pub struct VerticalRegistry {
    verticals: RwLock<HashMap<String, Arc<VerticalConfig>>>,
}

impl VerticalRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            verticals: RwLock::new(HashMap::new()),
        }
    }

    /// A registry holding the six bundled verticals.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        for vertical in builtin_verticals() {
            registry.register(vertical);
        }
        registry
    }

    /// Insert or replace a vertical.
    pub fn register(&self, vertical: VerticalConfig) {
        self.verticals
            .write()
            .insert(vertical.name.clone(), Arc::new(vertical));
    }

    /// Fails closed with `VerticalNotFound`.
    pub fn get(&self, name: &str) -> DworkersResult<Arc<VerticalConfig>> {
        self.verticals
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| DworkersError::VerticalNotFound(name.to_string()))
    }

    /// Vertical names, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.verticals.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Prompt fragments for `names`, in order. Unknown names are logged and
    /// skipped.
    pub fn fragments_for(&self, names: &[String]) -> Vec<String> {
        names
            .iter()
            .filter_map(|name| match self.get(name) {
                Ok(v) => Some(v.system_prompt_fragment.clone()),
                Err(_) => {
                    warn!(vertical = %name, "Unknown vertical, skipping");
                    None
                }
            })
            .collect()
    }

    /// Drop every vertical.
    pub fn clear(&self) {
        self.verticals.write().clear();
    }
}

impl Default for VerticalRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

fn builtin_verticals() -> Vec<VerticalConfig> {
    vec![
        VerticalConfig::new(
            "banking",
            "Banking & Financial Services",
            &[
                "Financial strategy and planning",
                "Regulatory compliance (Basel III, PSD2)",
                "Fraud detection and prevention",
                "Risk management and assessment",
                "Fintech integration and innovation",
            ],
            "You are working in the Banking & Financial Services consulting vertical. \
             Focus on financial strategy, regulatory compliance, fraud detection, \
             risk management, and fintech integration. Reference frameworks like \
             Basel III, PSD2, AML/KYC requirements, and IFRS standards.",
            &["Basel III", "PSD2", "AML", "KYC", "risk management", "fintech", "fraud detection"],
        ),
        VerticalConfig::new(
            "consumer",
            "Consumer Products & Retail",
            &[
                "Market entry and growth strategy",
                "Consumer behavior and trend analysis",
                "Brand management and positioning",
                "Retail strategy and channel optimization",
                "E-commerce and direct-to-consumer",
            ],
            "You are working in the Consumer Products & Retail consulting vertical. \
             Focus on market entry, consumer behavior, brand management, retail \
             strategy, and e-commerce optimization. Reference industry metrics \
             (market share, NPS, CAC, CLV, basket size).",
            &[
                "market entry",
                "consumer behavior",
                "brand management",
                "retail",
                "e-commerce",
                "DTC",
                "omnichannel",
            ],
        ),
        VerticalConfig::new(
            "gaming",
            "Gaming & Entertainment",
            &[
                "Market entry and competitive analysis",
                "Consumer behavior and player analytics",
                "User engagement and retention strategy",
                "Monetization strategy and optimization",
                "Content strategy and IP development",
            ],
            "You are working in the Gaming & Entertainment consulting vertical. \
             Focus on market entry, player analytics, user engagement, monetization \
             strategy, and content strategy. Reference gaming metrics (DAU, MAU, \
             ARPU, LTV, retention curves).",
            &[
                "user engagement",
                "monetization",
                "player analytics",
                "game design",
                "live ops",
                "esports",
                "content strategy",
            ],
        ),
        VerticalConfig::new(
            "healthcare",
            "Healthcare",
            &[
                "Strategy and policy consulting",
                "Patient data analysis and outcomes",
                "Operational efficiency and workflow optimization",
                "Regulatory compliance (HIPAA, FDA)",
                "Clinical workflow improvement",
            ],
            "You are working in the Healthcare consulting vertical. Focus on \
             healthcare strategy, patient outcomes, operational efficiency, and \
             regulatory compliance. Reference HIPAA, FDA regulations, and clinical \
             best practices, with care for patient privacy and safety.",
            &[
                "HIPAA",
                "FDA",
                "patient outcomes",
                "clinical workflows",
                "EHR",
                "telehealth",
                "population health",
            ],
        ),
        VerticalConfig::new(
            "legal",
            "Legal",
            &[
                "Legal compliance and governance",
                "Contract management and analysis",
                "Regulatory research and monitoring",
                "Intellectual property strategy",
                "Litigation support and case analysis",
            ],
            "You are working in the Legal consulting vertical. Focus on legal \
             compliance, contract management, regulatory research, IP strategy, and \
             litigation support. Maintain precision in legal language and citations.",
            &[
                "compliance",
                "contracts",
                "regulatory",
                "intellectual property",
                "litigation",
                "governance",
                "legal tech",
            ],
        ),
        VerticalConfig::new(
            "technology",
            "Technology",
            &[
                "Strategic IT planning",
                "Technology adoption and digital transformation",
                "Data-driven decision support",
                "Cloud architecture and migration",
                "Cybersecurity strategy",
            ],
            "You are working in the Technology consulting vertical. Focus on IT \
             strategy, digital transformation, cloud architecture, cybersecurity, and \
             data-driven decision-making. Reference frameworks like TOGAF, ITIL, and \
             SAFe where relevant.",
            &["IT", "digital transformation", "cloud", "cybersecurity", "data", "SaaS", "DevOps"],
        ),
    ]
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins() {
        let registry = VerticalRegistry::with_builtins();
        assert_eq!(
            registry.list(),
            vec!["banking", "consumer", "gaming", "healthcare", "legal", "technology"]
        );
        let banking = registry.get("banking").unwrap();
        assert!(banking.system_prompt_fragment.contains("Basel III"));
        assert_eq!(banking.focus_areas.len(), 5);
    }

    #[test]
    fn test_unknown_vertical() {
        let registry = VerticalRegistry::with_builtins();
        assert!(matches!(
            registry.get("aerospace"),
            Err(DworkersError::VerticalNotFound(_))
        ));
    }

    #[test]
    fn test_fragments_skip_unknown() {
        let registry = VerticalRegistry::with_builtins();
        let fragments =
            registry.fragments_for(&["legal".to_string(), "aerospace".to_string()]);
        assert_eq!(fragments.len(), 1);
        assert!(fragments[0].contains("Legal consulting vertical"));
    }

    #[test]
    fn test_clear() {
        let registry = VerticalRegistry::with_builtins();
        registry.clear();
        assert!(registry.list().is_empty());
    }
}
