//! Scrape 工具：抓取网页并转为可读文本
//!
//! - 输入缺少 scheme 时自动补 https://；
//! - 使用浏览器 UA 与超时；非 2xx 与网络错误返回描述性错误；
//! - 去除 script/style 后用 html2text 提取文本，整理空白但保留段落分隔；
//! - 可选追加链接摘要（相对链接按页面地址解析）；
//! - 提供 context 时只保留包含任一关键词的段落（无匹配则保留全文）；
//! - 超过 max_result_chars 时截断并追加 ...[truncated]。

use std::sync::OnceLock;

use async_trait::async_trait;
use html2text::from_read;
use regex::Regex;
use reqwest::Client;
use scraper::{Html, Selector};
use url::Url;

use crate::config::ScrapeSection;
use crate::tools::Tool;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// 链接摘要段落标题
const LINKS_HEADER: &str = "Links:";

pub struct ScrapeTool {
    client: Client,
    gather_links: bool,
    max_result_chars: usize,
}

impl ScrapeTool {
    pub fn new(cfg: &ScrapeSection) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(cfg.timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            gather_links: cfg.gather_links,
            max_result_chars: cfg.max_result_chars,
        }
    }

    async fn fetch(&self, url: &str) -> Result<String, String> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| format!("Error while scraping {}: {}", url, e))?;
        if !resp.status().is_success() {
            return Err(format!(
                "Failed to fetch page {}: HTTP status {}",
                url,
                resp.status().as_u16()
            ));
        }
        let body = resp
            .text()
            .await
            .map_err(|e| format!("Error while reading {}: {}", url, e))?;
        Ok(body.trim_start_matches('\u{FEFF}').to_string())
    }

    /// 抓取并整理页面文本
    pub async fn scrape(&self, input: &str, context: Option<&str>) -> Result<String, String> {
        let url = normalize_url(input);
        let html = self.fetch(&url).await?;

        let mut text = clean_text(&html_to_text(&html));

        if self.gather_links {
            let links = gather_links(&html, &url);
            if !links.is_empty() {
                text.push_str("\n\n");
                text.push_str(LINKS_HEADER);
                text.push('\n');
                text.push_str(&links.join("\n"));
            }
        }

        if let Some(ctx) = context {
            text = filter_by_context(&text, ctx);
        }

        Ok(truncate_chars(&text, self.max_result_chars))
    }
}

/// 没有 http(s) 前缀时补 https://
pub fn normalize_url(input: &str) -> String {
    let trimmed = input.trim();
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    }
}

fn script_style_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?is)<script\b[^>]*>.*?</script\s*>|<style\b[^>]*>.*?</style\s*>|<noscript\b[^>]*>.*?</noscript\s*>",
        )
        .ok()
    })
    .as_ref()
}

/// 去除 script/style 后转为纯文本；html2text 失败时回退到 scraper 取文本节点
pub fn html_to_text(html: &str) -> String {
    let stripped = match script_style_re() {
        Some(re) => re.replace_all(html, "").into_owned(),
        None => html.to_string(),
    };
    match from_read(stripped.as_bytes(), 120) {
        Ok(text) if !text.trim().is_empty() => text,
        _ => markup_text(&stripped),
    }
}

/// 逐个文本节点取出内容，每个节点占一行（html2text 失败时的回退）
fn markup_text(html: &str) -> String {
    let document = Html::parse_document(html);
    document
        .root_element()
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// 每行去首尾空白，按双空格拆成短语各占一行；连续空行折叠为一个段落分隔
pub fn clean_text(text: &str) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut pending_break = false;
    for line in text.lines() {
        let phrases: Vec<&str> = line
            .trim()
            .split("  ")
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();
        if phrases.is_empty() {
            pending_break = !lines.is_empty();
            continue;
        }
        if pending_break {
            lines.push(String::new());
            pending_break = false;
        }
        lines.extend(phrases.into_iter().map(String::from));
    }
    lines.join("\n")
}

/// 收集页面中的 <a href> 链接，输出 "文本: 绝对地址"
pub fn gather_links(html: &str, page_url: &str) -> Vec<String> {
    let Ok(selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };
    let base = Url::parse(page_url).ok();
    let document = Html::parse_document(html);

    document
        .select(&selector)
        .filter_map(|el| {
            let href = el.value().attr("href")?.trim();
            let text = el
                .text()
                .collect::<Vec<_>>()
                .join(" ")
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ");
            if text.is_empty() || href.is_empty() {
                return None;
            }
            let resolved = match &base {
                Some(b) => b.join(href).ok()?,
                None => Url::parse(href).ok()?,
            };
            if resolved.scheme() != "http" && resolved.scheme() != "https" {
                return None;
            }
            Some(format!("{}: {}", text, resolved))
        })
        .collect()
}

/// 只保留包含任一上下文关键词的段落；没有任何段落命中时原样返回
pub fn filter_by_context(text: &str, context: &str) -> String {
    let keywords: Vec<String> = context
        .split_whitespace()
        .map(|w| w.to_lowercase())
        .collect();
    if keywords.is_empty() {
        return text.to_string();
    }
    let relevant: Vec<&str> = text
        .split("\n\n")
        .filter(|para| {
            let lower = para.to_lowercase();
            keywords.iter().any(|k| lower.contains(k.as_str()))
        })
        .collect();
    if relevant.is_empty() {
        text.to_string()
    } else {
        relevant.join("\n\n")
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        text.chars().take(max_chars).collect::<String>() + "\n...[truncated]"
    } else {
        text.to_string()
    }
}

#[async_trait]
impl Tool for ScrapeTool {
    fn name(&self) -> &str {
        "scrape"
    }

    fn description(&self) -> &str {
        "Extract details from a discovered URL. Input: the page URL."
    }

    async fn execute(&self, input: &str, context: Option<&str>) -> Result<String, String> {
        if input.trim().is_empty() {
            return Err("Missing url".to_string());
        }
        tracing::info!(url = %input.trim(), "scrape tool fetch");
        self.scrape(input, context).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const PAGE: &str = r#"<!DOCTYPE html><html><head><title>Bookshops</title>
<style>body { color: red; }</style><script>var tracking = 1;</script></head>
<body><h1>Singapore bookshops</h1>
<p>Woods in the Books opens 10:00-19:00.</p>
<p>Hawker food is cheap and tasty.</p>
<a href="/guide">City guide</a> <a href="https://other.example/x">Other site</a>
<a href="mailto:hi@example.com">Mail</a></body></html>"#;

    /// 单连接 HTTP 服务：返回固定状态码与正文
    async fn serve_once(status: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let resp = format!(
                    "HTTP/1.1 {status}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = socket.write_all(resp.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });
        format!("http://{addr}")
    }

    #[test]
    fn test_normalize_url() {
        assert_eq!(normalize_url("example.com/a"), "https://example.com/a");
        assert_eq!(normalize_url(" http://example.com "), "http://example.com");
        assert_eq!(normalize_url("https://example.com"), "https://example.com");
    }

    #[test]
    fn test_html_to_text_drops_scripts() {
        let text = clean_text(&html_to_text(PAGE));
        assert!(text.contains("Woods in the Books"));
        assert!(!text.contains("tracking"));
        assert!(!text.contains("color: red"));
    }

    #[test]
    fn test_markup_text_one_node_per_line() {
        let text = markup_text("<div><b>Woods</b> in the <i>Books</i></div><p>10:00</p>");
        assert_eq!(text, "Woods\nin the\nBooks\n10:00");
    }

    #[test]
    fn test_clean_text_keeps_paragraphs() {
        let raw = "  first line  \n\n\n   second  part   \nthird\n\n";
        assert_eq!(clean_text(raw), "first line\n\nsecond\npart\nthird");
    }

    #[test]
    fn test_gather_links_resolves_relative() {
        let links = gather_links(PAGE, "https://books.example/sg/");
        assert_eq!(
            links,
            vec![
                "City guide: https://books.example/guide".to_string(),
                "Other site: https://other.example/x".to_string(),
            ]
        );
    }

    #[test]
    fn test_filter_by_context() {
        let text = "Bookshop hours here\n\nNothing relevant\n\nMore BOOKSHOP facts";
        assert_eq!(
            filter_by_context(text, "bookshop"),
            "Bookshop hours here\n\nMore BOOKSHOP facts"
        );
        assert_eq!(filter_by_context(text, "zebra"), text);
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("abcdef", 3), "abc\n...[truncated]");
        assert_eq!(truncate_chars("abc", 3), "abc");
    }

    #[tokio::test]
    async fn test_scrape_page_with_links() {
        let base = serve_once("200 OK", PAGE).await;
        let tool = ScrapeTool::new(&ScrapeSection::default());
        let text = tool.execute(&base, None).await.unwrap();
        assert!(text.contains("Hawker food is cheap"));
        assert!(text.contains("Links:"));
        assert!(text.contains(&format!("City guide: {base}/guide")));
    }

    #[tokio::test]
    async fn test_scrape_non_success_status() {
        let base = serve_once("404 Not Found", "gone").await;
        let tool = ScrapeTool::new(&ScrapeSection::default());
        let err = tool.execute(&base, None).await.unwrap_err();
        assert!(err.contains("HTTP status 404"));
    }
}
