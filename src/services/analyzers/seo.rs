//! SEO Phase
//!
//! Fetches the target over plain HTTP and checks title, meta description,
//! heading structure, image alt text, and indexing directives.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use regex::Regex;
use serde::Serialize;
use serde_json::json;
use webaudit_core::{CoreError, CoreResult, HttpClient, HttpErrorKind, HttpRequest};
use webaudit_pipeline::{Phase, PhaseContext, PhaseOutput};

use super::clamp_score;

const TITLE_MIN: usize = 30;
const TITLE_MAX: usize = 60;
const DESCRIPTION_MIN: usize = 120;
const DESCRIPTION_MAX: usize = 160;

fn title_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("static regex"))
}

fn meta_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<meta\s[^>]*>").expect("static regex"))
}

fn link_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<link\s[^>]*>").expect("static regex"))
}

fn attr_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?is)([a-z\-:]+)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("static regex")
    })
}

fn heading_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)<h([1-6])[\s>]").expect("static regex"))
}

fn img_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<img\s[^>]*>").expect("static regex"))
}

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<[^>]*>").expect("static regex"))
}

/// Attribute value of a single tag, matched case-insensitively by name.
fn attr<'a>(tag: &'a str, name: &str) -> Option<&'a str> {
    attr_re().captures_iter(tag).find_map(|caps| {
        let key = caps.get(1)?.as_str();
        if !key.eq_ignore_ascii_case(name) {
            return None;
        }
        caps.get(2).or_else(|| caps.get(3)).map(|m| m.as_str().trim())
    })
}

fn meta_content<'a>(html: &'a str, name: &str) -> Option<&'a str> {
    meta_re()
        .find_iter(html)
        .map(|m| m.as_str())
        .find(|tag| attr(tag, "name").is_some_and(|n| n.eq_ignore_ascii_case(name)))
        .and_then(|tag| attr(tag, "content"))
}

/// Findings extracted from one HTML document.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeoFindings {
    pub title: Option<String>,
    pub meta_description: Option<String>,
    pub h1_count: usize,
    pub heading_count: usize,
    pub image_count: usize,
    pub images_missing_alt: usize,
    pub canonical: Option<String>,
    pub noindex: bool,
}

pub fn extract(html: &str) -> SeoFindings {
    let title = title_re()
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| collapse_whitespace(&tag_re().replace_all(m.as_str(), "")))
        .filter(|t| !t.is_empty());

    let meta_description = meta_content(html, "description")
        .map(collapse_whitespace)
        .filter(|d| !d.is_empty());

    let levels: Vec<&str> = heading_re()
        .captures_iter(html)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect();

    let images: Vec<&str> = img_re().find_iter(html).map(|m| m.as_str()).collect();
    let images_missing_alt = images
        .iter()
        .filter(|tag| attr(tag, "alt").map_or(true, str::is_empty))
        .count();

    let canonical = link_re()
        .find_iter(html)
        .map(|m| m.as_str())
        .find(|tag| attr(tag, "rel").is_some_and(|r| r.eq_ignore_ascii_case("canonical")))
        .and_then(|tag| attr(tag, "href"))
        .map(str::to_string);

    let noindex = meta_content(html, "robots")
        .is_some_and(|content| content.to_ascii_lowercase().contains("noindex"));

    SeoFindings {
        title,
        meta_description,
        h1_count: levels.iter().filter(|l| **l == "1").count(),
        heading_count: levels.len(),
        image_count: images.len(),
        images_missing_alt,
        canonical,
        noindex,
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Score the findings and collect recommendations, most important first.
///
/// Weights: title 25%, description 20%, headings 20%, images 15%,
/// technical 20%.
pub fn score_findings(findings: &SeoFindings) -> (u8, Vec<String>) {
    let mut recs = Vec::new();

    let title = match &findings.title {
        None => {
            recs.push("Add a descriptive title tag".to_string());
            0.0
        }
        Some(t) if t.chars().count() < TITLE_MIN => {
            recs.push("Make title longer and more descriptive".to_string());
            70.0
        }
        Some(t) if t.chars().count() > TITLE_MAX => {
            recs.push(format!("Shorten title to under {} characters", TITLE_MAX));
            80.0
        }
        Some(_) => 100.0,
    };

    let description = match &findings.meta_description {
        None => {
            recs.push("Add a meta description to improve click-through from search results".to_string());
            0.0
        }
        Some(d) if d.chars().count() < DESCRIPTION_MIN => {
            recs.push("Make meta description longer and more compelling".to_string());
            75.0
        }
        Some(d) if d.chars().count() > DESCRIPTION_MAX => {
            recs.push(format!("Shorten meta description to under {} characters", DESCRIPTION_MAX));
            85.0
        }
        Some(_) => 100.0,
    };

    let mut headings: f64 = 100.0;
    match findings.h1_count {
        0 => {
            headings -= 40.0;
            recs.push("Add one H1 tag as main page heading".to_string());
        }
        1 => {}
        _ => {
            headings -= 20.0;
            recs.push("Use only one H1 tag per page".to_string());
        }
    }
    if findings.heading_count < 3 {
        headings -= 15.0;
        recs.push("Use more heading tags to structure content".to_string());
    }

    let images = if findings.image_count == 0 {
        100.0
    } else {
        let missing = findings.images_missing_alt as f64 / findings.image_count as f64;
        if findings.images_missing_alt > 0 {
            recs.push("Add descriptive alt text to all images".to_string());
        }
        100.0 - missing * 100.0
    };

    let mut technical: f64 = 100.0;
    if findings.canonical.is_none() {
        technical -= 15.0;
        recs.push("Add canonical URL to prevent duplicate content".to_string());
    }
    if findings.noindex {
        technical -= 40.0;
        recs.push("Remove the noindex directive if this page should appear in search".to_string());
    }

    let score = clamp_score(
        title * 0.25 + description * 0.20 + headings * 0.20 + images * 0.15 + technical * 0.20,
    );
    (score, recs)
}

pub struct SeoPhase {
    http: Arc<dyn HttpClient>,
}

impl SeoPhase {
    pub fn new(http: Arc<dyn HttpClient>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Phase for SeoPhase {
    fn id(&self) -> &str {
        "seo"
    }

    fn label(&self) -> &str {
        "SEO"
    }

    async fn run(&self, ctx: &PhaseContext) -> CoreResult<PhaseOutput> {
        let response = self.http.request(HttpRequest::get(ctx.target.as_str())).await?;
        if response.status >= 400 {
            return Err(CoreError::http(
                HttpErrorKind::Status,
                format!("page returned HTTP {}", response.status),
            ));
        }

        let mut findings = extract(&response.body);
        if let Some(robots) = response.header("x-robots-tag") {
            findings.noindex |= robots.to_ascii_lowercase().contains("noindex");
        }
        let (score, recommendations) = score_findings(&findings);

        let details = json!({
            "statusCode": response.status,
            "finalUrl": response.final_url,
            "findings": findings,
        });
        Ok(PhaseOutput::new(score, details).with_recommendations(recommendations))
    }
}
