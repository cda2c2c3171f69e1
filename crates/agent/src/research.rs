use std::str::FromStr;
use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::debug;

use parley_browser::{ActionSurface, SurfaceError};
use parley_core::PriceFinding;

/// Cap on findings returned from one snapshot; search pages repeat prices
/// heavily and the UI only has room for a handful.
const MAX_FINDINGS: usize = 8;

/// Scans a search-results snapshot for dollar amounts and returns them with
/// a short label taken from the surrounding line. Pure token scanning, no
/// markup awareness; lines without a recognizable money token are skipped.
pub fn extract_price_findings(snapshot: &str) -> Vec<PriceFinding> {
    let mut findings: Vec<PriceFinding> = Vec::new();

    for line in snapshot.lines() {
        for token in tokenize(line) {
            let Some(amount) = parse_money_token(&token) else {
                continue;
            };
            if findings.iter().any(|finding| finding.amount == amount) {
                continue;
            }
            findings.push(PriceFinding {
                label: label_for(line),
                amount,
                currency: "USD".to_owned(),
            });
            if findings.len() >= MAX_FINDINGS {
                return findings;
            }
        }
    }

    findings
}

fn tokenize(text: &str) -> Vec<String> {
    let mut sanitized = String::with_capacity(text.len());
    for character in text.chars() {
        if character.is_ascii_alphanumeric() || matches!(character, '$' | '.' | ',') {
            sanitized.push(character);
        } else {
            sanitized.push(' ');
        }
    }
    sanitized.split_whitespace().map(|token| token.to_string()).collect()
}

fn parse_money_token(token: &str) -> Option<Decimal> {
    let trimmed = token.strip_prefix('$')?.trim_end_matches(',').replace(',', "");
    if trimmed.is_empty() {
        return None;
    }

    let (number_part, multiplier) = if let Some(prefix) = trimmed.strip_suffix(['k', 'K']) {
        (prefix.to_owned(), Decimal::from(1_000))
    } else if let Some(prefix) = trimmed.strip_suffix(['m', 'M']) {
        (prefix.to_owned(), Decimal::from(1_000_000))
    } else {
        (trimmed, Decimal::ONE)
    };

    let amount = Decimal::from_str(&number_part).ok()?;
    if amount <= Decimal::ZERO {
        return None;
    }
    Some(amount * multiplier)
}

fn label_for(line: &str) -> String {
    let collapsed = line.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.len() <= 80 {
        collapsed
    } else {
        let mut label: String = collapsed.chars().take(77).collect();
        label.push_str("...");
        label
    }
}

/// Drives the research heuristic against its own action surface (never the
/// negotiation page; navigating that away would destroy the chat).
pub struct ResearchProbe {
    surface: Arc<dyn ActionSurface>,
}

impl ResearchProbe {
    pub fn new(surface: Arc<dyn ActionSurface>) -> Self {
        Self { surface }
    }

    pub async fn run(&self, query: &str) -> Result<Vec<PriceFinding>, SurfaceError> {
        let url = search_url(query);
        self.surface.navigate(&url).await?;
        let snapshot = self.surface.snapshot().await?;
        let findings = extract_price_findings(&snapshot);
        debug!(query, findings = findings.len(), "research probe completed");
        Ok(findings)
    }
}

fn search_url(query: &str) -> String {
    let encoded: String = query
        .chars()
        .map(|character| if character == ' ' { '+' } else { character })
        .filter(|character| character.is_ascii_alphanumeric() || matches!(character, '+' | '-'))
        .collect();
    format!("https://duckduckgo.com/?q={encoded}")
}
