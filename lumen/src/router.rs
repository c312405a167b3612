//! Rule-based query router
//!
//! Classifies a query by complexity and intent to pick the generation model
//! and to decide whether retrieval can be skipped. Ambiguous queries always
//! retrieve.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::{GenerationSettings, RouterSettings};
use crate::retrieval::Category;

const INTERROGATIVE_MARKERS: &[&str] = &[
    "?", "？", "吗", "呢", "什么", "怎么", "哪", "谁", "几", "多少", "what", "how", "who", "when",
    "where", "which",
];

const ANALYTICAL_MARKERS: &[&str] = &[
    "分析", "为什么", "如何", "原因", "why", "analyze", "analyse", "analysis", "explain",
];

const COMPARISON_MARKERS: &[&str] = &["比较", "对比", "vs", "compare", "versus"];

const PROFESSIONAL_TERMS: &[&str] = &["估值", "轮次", "valuation", "series", "due diligence"];

const TIME_MARKERS: &[&str] = &["最近", "未来", "趋势", "recent", "latest", "future", "trend"];

const COMPLEX_THRESHOLD: u32 = 5;
const MEDIUM_THRESHOLD: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComplexityTier {
    Simple,
    Medium,
    Complex,
}

impl fmt::Display for ComplexityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Simple => "simple",
            Self::Medium => "medium",
            Self::Complex => "complex",
        };
        f.write_str(s)
    }
}

/// What the user is asking about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    Founder,
    Funding,
    Contact,
    Company,
    General,
}

impl Intent {
    /// First matching intent wins, in declaration order
    pub fn detect(query: &str) -> Intent {
        let q = query.to_lowercase();
        let has = |needle: &str| q.contains(needle);

        if has("创始人") || has("founder") || (has("svtr") && (has("谁") || has("who"))) {
            Intent::Founder
        } else if has("融资") || has("投资") || (has("最新") && has("信息")) {
            Intent::Funding
        } else if [
            "联系", "对接", "合作", "融资需求", "项目", "咨询", "介绍", "推荐", "寻找", "需要资金",
            "一对一", "顾问服务", "建议", "contact",
        ]
        .iter()
        .any(|m| has(m))
        {
            Intent::Contact
        } else if has("openai") || has("chatgpt") {
            Intent::Company
        } else {
            Intent::General
        }
    }

    /// Retrieval text for `query` under this intent
    pub fn expand(&self, query: &str) -> String {
        match self {
            Self::Founder => format!("{} Min Liu Allen SVTR创始人 硅谷科技评论创始人", query),
            Self::Funding => format!("{} 2025年AI融资 投资数据 创投观察 融资报告", query),
            Self::Contact => format!("{} SVTR投资咨询服务 项目对接 商业合作", query),
            Self::Company => format!("{} OpenAI分析 ChatGPT GPT模型 AI公司", query),
            Self::General => query.to_string(),
        }
    }

    /// Terms used to rank retrieved context for the prompt
    pub fn keywords(&self, query: &str) -> Vec<String> {
        let fixed: &[&str] = match self {
            Self::Founder => &["Min Liu", "Allen", "创始人", "SVTR", "硅谷科技评论"],
            Self::Funding => &["融资", "投资", "2025", "AI创投", "资本"],
            Self::Contact => &["联系", "对接", "合作", "咨询", "服务", "推荐", "建议"],
            Self::Company => &["OpenAI", "ChatGPT", "GPT", "AI模型"],
            Self::General => {
                return query
                    .split_whitespace()
                    .filter(|w| w.chars().count() > 1)
                    .map(str::to_string)
                    .collect()
            }
        };
        fixed.iter().map(|s| s.to_string()).collect()
    }

    /// Fact-seeking intents are sent to the strongest model
    fn prefers_strong_model(&self) -> bool {
        matches!(self, Self::Founder | Self::Funding | Self::Company)
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Founder => "founder",
            Self::Funding => "funding",
            Self::Contact => "contact",
            Self::Company => "company",
            Self::General => "general",
        };
        f.write_str(s)
    }
}

/// Routing outcome for one query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteDecision {
    pub complexity: ComplexityTier,
    /// Heuristic complexity points
    pub score: u32,
    /// Human-readable reasons behind `score`
    pub factors: Vec<String>,
    pub skip_retrieval: bool,
    pub intent: Intent,
    /// Text handed to retrieval in place of the raw query
    pub expansion: String,
    pub keywords: Vec<String>,
    pub model: String,
}

/// Model chosen per complexity tier
#[derive(Debug, Clone)]
pub struct ModelTable {
    pub simple: String,
    pub medium: String,
    pub complex: String,
}

impl From<&GenerationSettings> for ModelTable {
    fn from(settings: &GenerationSettings) -> Self {
        Self {
            simple: settings.simple_model.clone(),
            medium: settings.medium_model.clone(),
            complex: settings.complex_model.clone(),
        }
    }
}

impl ModelTable {
    fn for_tier(&self, tier: ComplexityTier) -> &str {
        match tier {
            ComplexityTier::Simple => &self.simple,
            ComplexityTier::Medium => &self.medium,
            ComplexityTier::Complex => &self.complex,
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueryRouter {
    settings: RouterSettings,
    models: ModelTable,
}

impl Default for QueryRouter {
    fn default() -> Self {
        Self::new(RouterSettings::default(), (&GenerationSettings::default()).into())
    }
}

impl QueryRouter {
    pub fn new(settings: RouterSettings, models: ModelTable) -> Self {
        Self { settings, models }
    }

    pub fn classify(&self, query: &str) -> RouteDecision {
        let query = query.trim();
        let lowered = query.to_lowercase();
        let chars = query.chars().count();

        let mut score = 0u32;
        let mut factors = Vec::new();

        let long = chars > self.settings.long_query_chars;
        if long {
            score += 2;
            factors.push(format!("long query ({} chars)", chars));
        }

        let questions = query.matches(['?', '？']).count() as u32;
        if questions > 1 {
            score += questions;
            factors.push(format!("{} questions", questions));
        }

        let terms = count_markers(&lowered, PROFESSIONAL_TERMS);
        if terms > 1 {
            score += terms;
            factors.push(format!("{} professional terms", terms));
        }

        if count_markers(&lowered, COMPARISON_MARKERS) > 0 {
            score += 2;
            factors.push("comparison".to_string());
        }

        if is_time_sensitive(&lowered) {
            score += 1;
            factors.push("time-sensitive".to_string());
        }

        let analytical = count_markers(&lowered, ANALYTICAL_MARKERS) > 0;
        if analytical {
            score += 2;
            factors.push("analytical".to_string());
        }

        let complexity = if analytical || long || score >= COMPLEX_THRESHOLD {
            ComplexityTier::Complex
        } else if score >= MEDIUM_THRESHOLD {
            ComplexityTier::Medium
        } else {
            ComplexityTier::Simple
        };

        let intent = Intent::detect(query);
        let interrogative = count_markers(&lowered, INTERROGATIVE_MARKERS) > 0;
        let skip_retrieval = complexity == ComplexityTier::Simple
            && chars <= self.settings.short_query_chars
            && !interrogative
            && intent == Intent::General
            && Category::classify(query).is_none();

        let model = if intent.prefers_strong_model() {
            self.models.complex.clone()
        } else {
            self.models.for_tier(complexity).to_string()
        };

        RouteDecision {
            complexity,
            score,
            factors,
            skip_retrieval,
            intent,
            expansion: intent.expand(query),
            keywords: intent.keywords(query),
            model,
        }
    }
}

fn count_markers(lowered: &str, markers: &[&str]) -> u32 {
    markers.iter().filter(|m| lowered.contains(*m)).count() as u32
}

/// Years like `2024年`, months like `3月`, or relative time words
fn is_time_sensitive(lowered: &str) -> bool {
    if count_markers(lowered, TIME_MARKERS) > 0 {
        return true;
    }

    let chars: Vec<char> = lowered.chars().collect();
    let mut digits = 0usize;
    for c in chars {
        match c {
            '0'..='9' => digits += 1,
            '年' if digits >= 4 => return true,
            '月' if digits >= 1 => return true,
            _ => digits = 0,
        }
    }
    false
}
