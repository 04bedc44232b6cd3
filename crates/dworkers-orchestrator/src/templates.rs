//! Built-in consulting plans.
//!
//! All four share one shape: an analyst scopes the work, a researcher and a
//! data analyst work in parallel, an analyst synthesises and reports, and a
//! manager reviews.

use crate::plan::{Plan, PlanStep};
use dworkers_core::WorkerRole;

/// Checkpoint type on report steps.
pub const DELIVERABLE: &str = "deliverable";
/// Checkpoint type on the closing review step.
pub const FINAL_OUTPUT: &str = "final_output";

/// Every built-in template, sorted by name.
pub fn builtin_templates() -> Vec<Plan> {
    vec![
        customer_segmentation_plan(),
        market_analysis_plan(),
        process_improvement_plan(),
        technology_assessment_plan(),
    ]
}

/// Research, segmentation and targeting recommendations.
pub fn customer_segmentation_plan() -> Plan {
    Plan::new(
        "customer-segmentation",
        "Analyze customer data to identify segments and develop targeting strategies",
    )
    .with_step(
        PlanStep::new("gather-requirements", "Gather Requirements", WorkerRole::Analyst)
            .with_description("Collect business objectives, data sources, and segmentation criteria"),
    )
    .with_step(
        PlanStep::new("research-market", "Market Research", WorkerRole::Researcher)
            .with_description("Research industry benchmarks and segmentation best practices")
            .depends_on(&["gather-requirements"]),
    )
    .with_step(
        PlanStep::new("analyze-data", "Data Analysis", WorkerRole::DataAnalyst)
            .with_description("Analyze customer data, build segments, generate statistical profiles")
            .depends_on(&["gather-requirements"]),
    )
    .with_step(
        PlanStep::new("synthesize-report", "Synthesis & Report", WorkerRole::Analyst)
            .with_description(
                "Combine market research and data analysis into actionable recommendations",
            )
            .depends_on(&["research-market", "analyze-data"])
            .with_checkpoint(DELIVERABLE),
    )
    .with_step(
        PlanStep::new("project-review", "Project Review", WorkerRole::Manager)
            .with_description("Review deliverables, coordinate stakeholder feedback")
            .depends_on(&["synthesize-report"])
            .with_checkpoint(FINAL_OUTPUT),
    )
}

/// Scope, research and analysis leading to a reviewed strategy report.
pub fn market_analysis_plan() -> Plan {
    Plan::new(
        "market-analysis",
        "Research competitors, analyze market size, and generate strategy report",
    )
    .with_step(
        PlanStep::new("define-scope", "Define Scope", WorkerRole::Analyst).with_description(
            "Define target markets, geographies, and competitive landscape boundaries",
        ),
    )
    .with_step(
        PlanStep::new("research-competitors", "Competitive Research", WorkerRole::Researcher)
            .with_description("Research key competitors, their offerings, strengths, and weaknesses")
            .depends_on(&["define-scope"]),
    )
    .with_step(
        PlanStep::new("analyze-market-data", "Market Data Analysis", WorkerRole::DataAnalyst)
            .with_description("Analyze market size, growth rates, and demographic trends")
            .depends_on(&["define-scope"]),
    )
    .with_step(
        PlanStep::new("assess-opportunities", "Opportunity Assessment", WorkerRole::Analyst)
            .with_description(
                "Identify market gaps and strategic opportunities from research and data",
            )
            .depends_on(&["research-competitors", "analyze-market-data"]),
    )
    .with_step(
        PlanStep::new("strategy-report", "Strategy Report", WorkerRole::Analyst)
            .with_description("Compile findings into a comprehensive market strategy report")
            .depends_on(&["assess-opportunities"])
            .with_checkpoint(DELIVERABLE),
    )
    .with_step(
        PlanStep::new("executive-review", "Executive Review", WorkerRole::Manager)
            .with_description("Review strategy report and coordinate executive presentation")
            .depends_on(&["strategy-report"])
            .with_checkpoint(FINAL_OUTPUT),
    )
}

/// Current-state mapping through to a reviewed improvement report.
pub fn process_improvement_plan() -> Plan {
    Plan::new(
        "process-improvement",
        "Map current processes, identify gaps, and propose improvements",
    )
    .with_step(
        PlanStep::new("map-current-processes", "Map Current Processes", WorkerRole::Analyst)
            .with_description(
                "Document existing workflows, identify inputs/outputs, and map process flows",
            ),
    )
    .with_step(
        PlanStep::new("research-best-practices", "Research Best Practices", WorkerRole::Researcher)
            .with_description(
                "Research industry best practices and benchmark against peer organizations",
            )
            .depends_on(&["map-current-processes"]),
    )
    .with_step(
        PlanStep::new("analyze-process-data", "Analyze Process Data", WorkerRole::DataAnalyst)
            .with_description("Analyze cycle times, throughput, error rates, and bottleneck metrics")
            .depends_on(&["map-current-processes"]),
    )
    .with_step(
        PlanStep::new("identify-improvements", "Identify Improvements", WorkerRole::Analyst)
            .with_description("Synthesize research and data to identify improvement opportunities")
            .depends_on(&["research-best-practices", "analyze-process-data"]),
    )
    .with_step(
        PlanStep::new("improvement-report", "Improvement Report", WorkerRole::Analyst)
            .with_description(
                "Compile detailed recommendations with ROI projections and implementation roadmap",
            )
            .depends_on(&["identify-improvements"])
            .with_checkpoint(DELIVERABLE),
    )
    .with_step(
        PlanStep::new("stakeholder-review", "Stakeholder Review", WorkerRole::Manager)
            .with_description(
                "Present findings, gather feedback, and coordinate implementation planning",
            )
            .depends_on(&["improvement-report"])
            .with_checkpoint(FINAL_OUTPUT),
    )
}

/// Landscape scan, fit analysis and a reviewed recommendation.
pub fn technology_assessment_plan() -> Plan {
    Plan::new(
        "technology-assessment",
        "Assess current technology, research alternatives, and build recommendations",
    )
    .with_step(
        PlanStep::new("assess-current-tech", "Assess Current Technology", WorkerRole::Analyst)
            .with_description("Audit existing technology stack, integrations, and capabilities"),
    )
    .with_step(
        PlanStep::new("research-alternatives", "Research Alternatives", WorkerRole::Researcher)
            .with_description("Research alternative technologies, vendors, and emerging solutions")
            .depends_on(&["assess-current-tech"]),
    )
    .with_step(
        PlanStep::new("analyze-tech-data", "Analyze Technology Data", WorkerRole::DataAnalyst)
            .with_description("Analyze performance metrics, cost data, and usage patterns")
            .depends_on(&["assess-current-tech"]),
    )
    .with_step(
        PlanStep::new("build-recommendations", "Build Recommendations", WorkerRole::Analyst)
            .with_description("Synthesize research and data into technology recommendations")
            .depends_on(&["research-alternatives", "analyze-tech-data"]),
    )
    .with_step(
        PlanStep::new("assessment-report", "Assessment Report", WorkerRole::Analyst)
            .with_description(
                "Compile findings into a technology assessment report with migration plan",
            )
            .depends_on(&["build-recommendations"])
            .with_checkpoint(DELIVERABLE),
    )
    .with_step(
        PlanStep::new("governance-review", "Governance Review", WorkerRole::Manager)
            .with_description(
                "Review assessment with governance board and coordinate approval process",
            )
            .depends_on(&["assessment-report"])
            .with_checkpoint(FINAL_OUTPUT),
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::graph::PlanGraph;

    #[test]
    fn test_all_templates_compile() {
        for plan in builtin_templates() {
            let graph = PlanGraph::compile(&plan).unwrap();
            assert_eq!(graph.sinks().len(), 1, "{}", plan.name);
            assert_eq!(graph.layers()[1].len(), 2, "{}", plan.name);
        }
    }

    #[test]
    fn test_template_shapes() {
        let sizes: Vec<(String, usize)> = builtin_templates()
            .into_iter()
            .map(|p| (p.name.clone(), p.steps.len()))
            .collect();
        assert_eq!(
            sizes,
            vec![
                ("customer-segmentation".to_string(), 5),
                ("market-analysis".to_string(), 6),
                ("process-improvement".to_string(), 6),
                ("technology-assessment".to_string(), 6),
            ]
        );
    }

    #[test]
    fn test_review_steps_gate_final_output() {
        for plan in builtin_templates() {
            let last = plan.steps.last().unwrap();
            assert_eq!(last.worker_role, WorkerRole::Manager);
            assert_eq!(last.checkpoint.as_deref(), Some(FINAL_OUTPUT));
            let reports = plan
                .steps
                .iter()
                .filter(|s| s.checkpoint.as_deref() == Some(DELIVERABLE))
                .count();
            assert_eq!(reports, 1);
        }
    }
}
