use std::collections::BTreeMap;

use anyhow::{Context, Result, anyhow};
use once_cell::sync::Lazy;
use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::USER_AGENT;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use tracing::{debug, warn};

const CLASS_ORDER: [&str; 5] = ["FR", "SO", "JR", "SR", "GR"];

static H1: Lazy<Selector> = Lazy::new(|| selector("h1"));
static META_LINES: Lazy<Selector> = Lazy::new(|| selector("div#meta p, div#meta li"));
static LINK: Lazy<Selector> = Lazy::new(|| selector("a"));
static TABLE: Lazy<Selector> = Lazy::new(|| selector("table"));
static ROW: Lazy<Selector> = Lazy::new(|| selector("tr"));
static HEADER_CELL: Lazy<Selector> = Lazy::new(|| selector("th"));
static DATA_CELL: Lazy<Selector> = Lazy::new(|| selector("td"));

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("valid selector")
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PlayerProfile {
    pub name: String,
    pub position: String,
    pub height: String,
    pub weight: String,
    pub hometown: String,
    pub school: String,
    /// Per-game rows keyed by column header, one per season.
    pub stats: Vec<BTreeMap<String, String>>,
    pub career_totals: BTreeMap<String, String>,
}

/// Web data source for player profiles. `Ok(None)` means "no such player";
/// any other failure is an error.
pub trait PlayerSource: Send + Sync {
    fn fetch_player(&self, locator: &str) -> Result<Option<PlayerProfile>>;
}

pub struct HttpPlayerSource {
    client: &'static Client,
}

impl HttpPlayerSource {
    pub fn new(client: &'static Client) -> Self {
        Self { client }
    }
}

impl PlayerSource for HttpPlayerSource {
    fn fetch_player(&self, locator: &str) -> Result<Option<PlayerProfile>> {
        let resp = self
            .client
            .get(locator)
            .header(USER_AGENT, "Mozilla/5.0")
            .send()
            .with_context(|| format!("request {locator}"))?;
        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            debug!(locator, "player page not found");
            return Ok(None);
        }
        let body = resp.text().context("failed reading body")?;
        if !status.is_success() {
            return Err(anyhow!("http {} for {}", status, locator));
        }
        let profile = parse_player_page(&body);
        if profile.name.is_empty() {
            warn!(locator, "player page has no name heading");
            return Ok(None);
        }
        Ok(Some(profile))
    }
}

/// Commented-out markup is not part of the document, so tables hidden inside
/// `<!-- -->` are never picked up.
pub fn parse_player_page(html: &str) -> PlayerProfile {
    let document = Html::parse_document(html);
    let mut profile = PlayerProfile {
        name: document
            .select(&H1)
            .next()
            .map(element_text)
            .unwrap_or_default(),
        ..Default::default()
    };

    for line in document.select(&META_LINES) {
        let text = element_text(line);
        if let Some((_, rest)) = text.split_once("Position:") {
            profile.position = rest.trim().to_string();
        }
        if text.contains("lb") && text.contains('(') {
            let parts: Vec<&str> = text.split(',').collect();
            if parts.len() >= 2 {
                profile.height = parts[0].trim().to_string();
                profile.weight = parts[1].trim().to_string();
            }
        }
        if let Some((_, rest)) = text.split_once("Hometown:") {
            profile.hometown = rest.trim().to_string();
        }
        if text.contains("School:") {
            if let Some(link) = line.select(&LINK).next() {
                profile.school = element_text(link);
            }
        }
    }

    for table in document.select(&TABLE) {
        let header_cells = cell_texts(table, &HEADER_CELL);
        if !header_cells.iter().any(|h| h == "G") || !header_cells.iter().any(|h| h == "PTS") {
            continue;
        }
        let rows: Vec<ElementRef> = table.select(&ROW).collect();
        let Some(first) = rows.first() else {
            continue;
        };
        let keys: Vec<String> = cell_texts(*first, &HEADER_CELL).into_iter().skip(1).collect();
        for row in rows.iter().skip(1) {
            let cols = cell_texts(*row, &DATA_CELL);
            if cols.is_empty() {
                continue;
            }
            if element_text(*row).contains("Career") {
                profile.career_totals = keys.iter().cloned().zip(cols).collect();
            } else if cols.len() == keys.len() {
                profile.stats.push(keys.iter().cloned().zip(cols).collect());
            }
        }
        break;
    }

    profile
}

/// Season index per row: FR..GR map to 1..5 and unknown classes carry the
/// previous value forward. Without a Class column rows count 1..n.
pub fn synthetic_seasons(rows: &[BTreeMap<String, String>]) -> Vec<Option<f64>> {
    let has_class = rows.iter().any(|r| r.contains_key("Class"));
    if !has_class {
        return (1..=rows.len()).map(|i| Some(i as f64)).collect();
    }
    let mut last = None;
    rows.iter()
        .map(|row| {
            let class = row.get("Class").map(|c| c.trim().to_uppercase());
            let mapped = class
                .and_then(|c| CLASS_ORDER.iter().position(|k| *k == c))
                .map(|i| (i + 1) as f64);
            if mapped.is_some() {
                last = mapped;
            }
            last
        })
        .collect()
}

/// Decoded text content with runs of whitespace (including `&nbsp;`)
/// collapsed to one space.
fn element_text(el: ElementRef) -> String {
    el.text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn cell_texts(el: ElementRef, cells: &Selector) -> Vec<String> {
    el.select(cells).map(element_text).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
<html><body>
<div id="info"><div id="meta">
  <div><h1><span>Luka Garza</span></h1>
  <p><strong>Position:</strong> Center</p>
  <p><span>6-11</span>,&nbsp;<span>265lb</span> (211cm, 120kg)</p>
  <p><strong>Hometown:</strong> Washington, DC</p>
  <p><strong>School:</strong> <a href="/cbb/schools/iowa/">Iowa</a></p>
  </div>
</div></div>
<table id="players_per_game">
<thead><tr><th>Season</th><th>Class</th><th>G</th><th>PTS</th></tr></thead>
<tbody>
<tr><th>2017-18</th><td>FR</td><td>33</td><td>12.1</td></tr>
<tr><th>2018-19</th><td>SO</td><td>35</td><td>13.1</td></tr>
<tr><th>Career</th><td></td><td>68</td><td>12.6</td></tr>
</tbody></table>
</body></html>
"#;

    #[test]
    fn parses_meta_block() {
        let p = parse_player_page(PAGE);
        assert_eq!(p.name, "Luka Garza");
        assert_eq!(p.position, "Center");
        assert_eq!(p.height, "6-11");
        assert_eq!(p.weight, "265lb (211cm");
        assert_eq!(p.hometown, "Washington, DC");
        assert_eq!(p.school, "Iowa");
    }

    #[test]
    fn parses_per_game_rows_and_career() {
        let p = parse_player_page(PAGE);
        assert_eq!(p.stats.len(), 2);
        assert_eq!(p.stats[1].get("PTS").map(String::as_str), Some("13.1"));
        assert_eq!(p.career_totals.get("G").map(String::as_str), Some("68"));
    }

    #[test]
    fn commented_table_is_skipped() {
        let page = r#"<html><body><h1>Luka Garza</h1>
<!--
<table><tr><th>Season</th><th>G</th><th>PTS</th></tr>
<tr><th>2017-18</th><td>1</td><td>99.0</td></tr></table>
-->
<table><tr><th>Season</th><th>G</th><th>PTS</th></tr>
<tr><th>2017-18</th><td>33</td><td>12.0</td></tr></table>
</body></html>"#;
        let p = parse_player_page(page);
        assert_eq!(p.stats.len(), 1);
        assert_eq!(p.stats[0].get("PTS").map(String::as_str), Some("12.0"));
        assert_eq!(p.stats[0].get("G").map(String::as_str), Some("33"));
    }

    #[test]
    fn numeric_entities_are_decoded() {
        let page = r#"<html><body><div id="meta">
<h1>De&#x27;Aaron Fox</h1>
<p><strong>Hometown:</strong> Coeur d&#8217;Alene, ID</p>
</div></body></html>"#;
        let p = parse_player_page(page);
        assert_eq!(p.name, "De'Aaron Fox");
        assert_eq!(p.hometown, "Coeur d\u{2019}Alene, ID");
    }

    #[test]
    fn seasons_forward_fill_unknown_classes() {
        let rows: Vec<BTreeMap<String, String>> = ["FR", "??", "JR"]
            .iter()
            .map(|c| BTreeMap::from([("Class".to_string(), c.to_string())]))
            .collect();
        assert_eq!(synthetic_seasons(&rows), vec![Some(1.0), Some(1.0), Some(3.0)]);
        assert_eq!(
            synthetic_seasons(&[BTreeMap::new(), BTreeMap::new()]),
            vec![Some(1.0), Some(2.0)]
        );
    }
}
