use parley_core::config::{AppConfig, LlmProvider, LoadOptions, SurfaceMode};
use secrecy::ExposeSecret;
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> String {
    let report = build_report();

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                error.to_string().replace('"', "\\\"")
            )
        });
    }

    render_human(&report)
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_decision_capability(&config));
            checks.push(check_surface(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            checks.push(DoctorCheck {
                name: "decision_capability_readiness",
                status: CheckStatus::Skipped,
                details: "skipped because configuration did not load".to_string(),
            });
            checks.push(DoctorCheck {
                name: "surface_readiness",
                status: CheckStatus::Skipped,
                details: "skipped because configuration did not load".to_string(),
            });
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_decision_capability(config: &AppConfig) -> DoctorCheck {
    let details = match config.llm.provider {
        LlmProvider::OpenAi | LlmProvider::Anthropic => {
            let key_present = config
                .llm
                .api_key
                .as_ref()
                .map(|secret| !secret.expose_secret().trim().is_empty())
                .unwrap_or(false);
            if !key_present {
                return DoctorCheck {
                    name: "decision_capability_readiness",
                    status: CheckStatus::Fail,
                    details: "hosted provider selected but no api key configured".to_string(),
                };
            }
            format!("provider {:?} with api key configured", config.llm.provider)
        }
        LlmProvider::Ollama => format!(
            "local provider at {}",
            config.llm.base_url.as_deref().unwrap_or("(unset)")
        ),
    };

    DoctorCheck { name: "decision_capability_readiness", status: CheckStatus::Pass, details }
}

fn check_surface(config: &AppConfig) -> DoctorCheck {
    match config.surface.mode {
        SurfaceMode::Noop => DoctorCheck {
            name: "surface_readiness",
            status: CheckStatus::Pass,
            details: "noop surface: sessions run without a browser (dry-run mode)".to_string(),
        },
        SurfaceMode::HttpBridge => match config.surface.bridge_url.as_deref() {
            Some(url) if !url.trim().is_empty() => DoctorCheck {
                name: "surface_readiness",
                status: CheckStatus::Pass,
                details: format!("http bridge configured at {url}"),
            },
            _ => DoctorCheck {
                name: "surface_readiness",
                status: CheckStatus::Fail,
                details: "http_bridge mode selected but no bridge url configured".to_string(),
            },
        },
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = vec![report.summary.clone()];
    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "FAIL",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("  [{marker}] {}: {}", check.name, check.details));
    }
    lines.join("\n")
}
