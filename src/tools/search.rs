//! Search 工具：通过 Tavily REST API 做网页搜索
//!
//! 返回 `{url, title, description}` 列表，格式化为 Title / URL Source / Description 文本块。
//! 未配置 TAVILY_API_KEY 时返回错误（由执行器转成失败记录）；服务端错误只记日志并返回空列表。

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::SearchSection;
use crate::tools::Tool;

/// 一条搜索结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchResult {
    pub url: String,
    pub title: String,
    pub description: String,
}

#[derive(Debug, Serialize)]
struct TavilyRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    search_depth: &'a str,
    max_results: usize,
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    #[serde(default)]
    url: String,
    #[serde(default)]
    title: String,
    /// Tavily 用 content 而不是 description
    #[serde(default)]
    content: String,
}

impl From<TavilyResult> for SearchResult {
    fn from(r: TavilyResult) -> Self {
        Self {
            url: r.url,
            title: r.title,
            description: r.content,
        }
    }
}

pub struct SearchTool {
    client: Client,
    api_base: String,
    api_key: Option<String>,
    search_depth: String,
    max_results: usize,
}

impl SearchTool {
    pub fn new(cfg: &SearchSection, api_key: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(cfg.timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            client,
            api_base: cfg.api_base.trim_end_matches('/').to_string(),
            api_key,
            search_depth: cfg.search_depth.clone(),
            max_results: cfg.max_results,
        }
    }

    /// 搜索；仅缺少 API Key 时返回 Err，其余失败返回空列表
    pub async fn search(&self, query: &str) -> Result<Vec<SearchResult>, String> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            format!(
                "{} environment variable not set",
                crate::config::SEARCH_API_KEY_VAR
            )
        })?;

        match self.query_provider(api_key, query).await {
            Ok(results) => Ok(results),
            Err(e) => {
                tracing::warn!(query = %query, error = %e, "tavily search failed");
                Ok(Vec::new())
            }
        }
    }

    async fn query_provider(&self, api_key: &str, query: &str) -> Result<Vec<SearchResult>, String> {
        let body = TavilyRequest {
            api_key,
            query,
            search_depth: &self.search_depth,
            max_results: self.max_results,
        };
        let resp = self
            .client
            .post(format!("{}/search", self.api_base))
            .json(&body)
            .send()
            .await
            .map_err(|e| format!("Request failed: {}", e))?;
        if !resp.status().is_success() {
            return Err(format!("HTTP {}", resp.status()));
        }
        let parsed: TavilyResponse = resp
            .json()
            .await
            .map_err(|e| format!("Decode body: {}", e))?;
        Ok(parsed.results.into_iter().map(SearchResult::from).collect())
    }
}

/// 格式化为模型可读文本，结果之间空一行
pub fn format_results(results: &[SearchResult]) -> String {
    results
        .iter()
        .map(|r| {
            format!(
                "Title: {}\nURL Source: {}\nDescription: {}\n",
                r.title, r.url, r.description
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
        .trim_end()
        .to_string()
}

#[async_trait]
impl Tool for SearchTool {
    fn name(&self) -> &str {
        "search"
    }

    fn description(&self) -> &str {
        "Broad web search for new topics or concepts. Input: a search query."
    }

    async fn execute(&self, input: &str, _context: Option<&str>) -> Result<String, String> {
        let query = input.trim();
        if query.is_empty() {
            return Err("Missing query".to_string());
        }
        tracing::info!(query = %query, "search tool query");
        let results = self.search(query).await?;
        if results.is_empty() {
            return Ok(format!("No results found for: {}", query));
        }
        Ok(format_results(&results))
    }
}
