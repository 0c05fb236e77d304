//! `MissionController` (§4.5, C9): drives a Mission's
//! `Pending → Running → InReview → Completed | Failed` state machine by
//! running its declared completion checks on an interval.
//!
//! Each check kind talks to a small capability trait standing in for the
//! external system it queries — `llm_judge` through `kais_llm::Mind`,
//! `tool_output`/`metric` through the event store, `human` through a review
//! record — the same "name the boundary, supply an in-memory fake" shape as
//! `kais_events::DbClient`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;

use kais_core::{CheckResult, CompletionCheck, CompletionCheckType, Error, MissionEntrypoint, MissionPhase, MissionSpec, Result};
use kais_llm::{ContentBlock, LlmMessage, Mind, ThinkRequest};

use crate::kube::KubeClient;

/// Last recorded output of a named tool invoked in service of a Mission's
/// entrypoint (§4.5 `tool_output` check).
#[async_trait]
pub trait ToolOutputSource: Send + Sync {
    async fn last_output(&self, entrypoint: &str, tool_name: &str) -> Result<Option<String>>;
}

/// A named numeric metric recorded for a Mission's entrypoint (§4.5 `metric`
/// check, §6 usage aggregation).
#[async_trait]
pub trait MetricSource: Send + Sync {
    async fn read_metric(&self, entrypoint: &str, metric_name: &str) -> Result<Option<f64>>;
}

/// A pending or decided human review record (§4.5 `human` check). `Ok(None)`
/// means still awaiting a decision.
#[async_trait]
pub trait ReviewSource: Send + Sync {
    async fn decision(&self, mission_name: &str, check_name: &str) -> Result<Option<bool>>;
}

/// Cumulative spend for a Mission's entrypoint, read from the event store's
/// usage totals (§4.5 "Failed on budget overrun").
#[async_trait]
pub trait BudgetSource: Send + Sync {
    async fn total_spent(&self, entrypoint: &str) -> Result<f64>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CheckOutcome {
    Passed,
    Failed,
    Pending,
}

pub struct MissionController {
    kube: Arc<dyn KubeClient>,
    judge: Option<Arc<dyn Mind>>,
    tool_output: Option<Arc<dyn ToolOutputSource>>,
    metrics: Option<Arc<dyn MetricSource>>,
    review: Option<Arc<dyn ReviewSource>>,
    budget: Option<Arc<dyn BudgetSource>>,
}

impl MissionController {
    pub fn new(kube: Arc<dyn KubeClient>) -> Self {
        Self { kube, judge: None, tool_output: None, metrics: None, review: None, budget: None }
    }

    pub fn with_judge(mut self, judge: Arc<dyn Mind>) -> Self {
        self.judge = Some(judge);
        self
    }
    pub fn with_tool_output(mut self, source: Arc<dyn ToolOutputSource>) -> Self {
        self.tool_output = Some(source);
        self
    }
    pub fn with_metrics(mut self, source: Arc<dyn MetricSource>) -> Self {
        self.metrics = Some(source);
        self
    }
    pub fn with_review(mut self, source: Arc<dyn ReviewSource>) -> Self {
        self.review = Some(source);
        self
    }
    pub fn with_budget(mut self, source: Arc<dyn BudgetSource>) -> Self {
        self.budget = Some(source);
        self
    }

    fn entrypoint_name(entrypoint: &MissionEntrypoint) -> &str {
        match entrypoint {
            MissionEntrypoint::Cell(name) | MissionEntrypoint::Formation(name) => name,
        }
    }

    /// Observe → compute desired state → diff → patch for one `Mission`
    /// (§4.5). A no-op once the Mission has reached a terminal phase.
    pub async fn reconcile(&self, namespace: &str, name: &str) -> Result<()> {
        let Some(mut mission) = self.kube.missions().get(namespace, name).await? else {
            return Ok(());
        };
        if matches!(mission.status.phase, MissionPhase::Completed | MissionPhase::Failed) {
            return Ok(());
        }

        let entrypoint = Self::entrypoint_name(&mission.spec.entrypoint);
        if let Some(budget) = &self.budget {
            let spent = budget.total_spent(entrypoint).await?;
            if mission.spec.budget.max_total_cost > 0.0 && spent > mission.spec.budget.max_total_cost {
                mission.status.phase = MissionPhase::Failed;
                mission.status.history.push(format!("budget exceeded at {}", Utc::now()));
                self.kube.missions().put(mission).await?;
                return Ok(());
            }
        }

        let mut results = Vec::with_capacity(mission.spec.completion_checks.len());
        let mut any_required_failed = false;
        let mut any_required_pending = false;
        let mut any_required_human_pending = false;

        for check in &mission.spec.completion_checks {
            let outcome = self.evaluate(entrypoint, name, check).await?;
            results.push(CheckResult {
                name: check.name.clone(),
                passed: outcome == CheckOutcome::Passed,
                checked_at: Utc::now(),
                detail: None,
            });
            if check.required {
                match outcome {
                    CheckOutcome::Failed => any_required_failed = true,
                    CheckOutcome::Pending => {
                        any_required_pending = true;
                        if check.kind == CompletionCheckType::Human {
                            any_required_human_pending = true;
                        }
                    }
                    CheckOutcome::Passed => {}
                }
            }
        }

        mission.status.phase = if any_required_failed {
            MissionPhase::Failed
        } else if any_required_human_pending {
            MissionPhase::InReview
        } else if any_required_pending {
            MissionPhase::Running
        } else {
            MissionPhase::Completed
        };
        mission.status.check_results = results;
        mission.status.history.push(format!("{:?} at {}", mission.status.phase, Utc::now()));
        self.kube.missions().put(mission).await
    }

    async fn evaluate(&self, entrypoint: &str, mission_name: &str, check: &CompletionCheck) -> Result<CheckOutcome> {
        match check.kind {
            CompletionCheckType::LlmJudge => {
                let Some(judge) = &self.judge else {
                    return Ok(CheckOutcome::Pending);
                };
                let prompt = check.predicate.clone().unwrap_or_else(|| check.name.clone());
                let request = ThinkRequest {
                    messages: vec![LlmMessage { role: "user".to_string(), content: prompt.into() }],
                    ..Default::default()
                };
                let result = judge.think(request).await.map_err(|e| Error::llm_error(judge.name(), e.to_string()))?;
                let text = result
                    .content
                    .iter()
                    .filter_map(|block| match block {
                        ContentBlock::Text { text } => Some(text.as_str()),
                        _ => None,
                    })
                    .collect::<String>();
                Ok(if text.to_lowercase().contains("yes") { CheckOutcome::Passed } else { CheckOutcome::Failed })
            }
            CompletionCheckType::ToolOutput => {
                let Some(source) = &self.tool_output else {
                    return Ok(CheckOutcome::Pending);
                };
                match source.last_output(entrypoint, &check.name).await? {
                    None => Ok(CheckOutcome::Pending),
                    Some(output) => {
                        let pattern = check.predicate.as_deref().unwrap_or(".*");
                        let re = Regex::new(pattern).map_err(|e| Error::validation(e.to_string()))?;
                        Ok(if re.is_match(&output) { CheckOutcome::Passed } else { CheckOutcome::Failed })
                    }
                }
            }
            CompletionCheckType::Metric => {
                let Some(source) = &self.metrics else {
                    return Ok(CheckOutcome::Pending);
                };
                match source.read_metric(entrypoint, &check.name).await? {
                    None => Ok(CheckOutcome::Pending),
                    Some(value) => {
                        let expr = check.predicate.as_deref().unwrap_or(">0");
                        Ok(if eval_threshold(expr, value)? { CheckOutcome::Passed } else { CheckOutcome::Failed })
                    }
                }
            }
            CompletionCheckType::Human => {
                let Some(source) = &self.review else {
                    return Ok(CheckOutcome::Pending);
                };
                match source.decision(mission_name, &check.name).await? {
                    None => Ok(CheckOutcome::Pending),
                    Some(true) => Ok(CheckOutcome::Passed),
                    Some(false) => Ok(CheckOutcome::Failed),
                }
            }
        }
    }
}

/// Parses `<op><threshold>` (e.g. `">=0.9"`, `"<10"`) and applies it to `value`.
fn eval_threshold(expr: &str, value: f64) -> Result<bool> {
    let expr = expr.trim();
    let (op, rest) = if let Some(r) = expr.strip_prefix(">=") {
        (">=", r)
    } else if let Some(r) = expr.strip_prefix("<=") {
        ("<=", r)
    } else if let Some(r) = expr.strip_prefix('>') {
        (">", r)
    } else if let Some(r) = expr.strip_prefix('<') {
        ("<", r)
    } else if let Some(r) = expr.strip_prefix("==") {
        ("==", r)
    } else {
        return Err(Error::validation(format!("invalid metric predicate: {expr}")));
    };
    let threshold: f64 = rest.trim().parse().map_err(|_| Error::validation(format!("invalid metric threshold: {rest}")))?;
    Ok(match op {
        ">=" => value >= threshold,
        "<=" => value <= threshold,
        ">" => value > threshold,
        "<" => value < threshold,
        "==" => (value - threshold).abs() < 1e-9,
        _ => unreachable!(),
    })
}
