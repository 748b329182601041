//! 百科查询：MediaWiki action API（默认西班牙语版）
//!
//! 三步：list=search 取最佳标题 -> prop=extracts|pageprops 取前 N 句纯文本摘要；
//! 若为消歧义页，再取最多 5 个链接标题作为候选。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::tools::CapabilityError;

const EMPTY_QUERY: &str = "No hay consulta para buscar";
const MAX_OPTIONS: usize = 5;

/// 百科后端：query -> 摘要
#[async_trait]
pub trait Encyclopedia: Send + Sync {
    async fn summary(&self, query: &str, sentences: usize) -> Result<String, CapabilityError>;
}

/// 空查询直接返回固定提示，不访问后端
pub async fn lookup(
    encyclopedia: &dyn Encyclopedia,
    query: &str,
    sentences: usize,
) -> Result<String, CapabilityError> {
    let query = query.trim();
    if query.is_empty() {
        return Err(CapabilityError::EmptyInput(EMPTY_QUERY));
    }
    encyclopedia.summary(query, sentences).await
}

#[derive(Debug, Deserialize)]
struct ApiResponse<Q> {
    query: Option<Q>,
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    #[serde(default)]
    search: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    title: String,
}

#[derive(Debug, Deserialize)]
struct PagesQuery {
    #[serde(default)]
    pages: Vec<Page>,
}

#[derive(Debug, Deserialize)]
struct Page {
    title: String,
    #[serde(default)]
    missing: bool,
    #[serde(default)]
    extract: Option<String>,
    #[serde(default)]
    pageprops: Option<PageProps>,
    #[serde(default)]
    links: Vec<Link>,
}

#[derive(Debug, Deserialize)]
struct PageProps {
    disambiguation: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct Link {
    title: String,
}

pub struct WikipediaClient {
    client: Client,
    api_url: String,
}

impl WikipediaClient {
    /// language 如 "es"；base_url 为空时使用 https://{language}.wikipedia.org
    pub fn new(language: &str, base_url: Option<&str>, timeout_secs: u64) -> Result<Self, CapabilityError> {
        let base = base_url
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| format!("https://{language}.wikipedia.org"));
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(concat!("socrates/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CapabilityError::Backend(e.to_string()))?;
        Ok(Self {
            client,
            api_url: format!("{base}/w/api.php"),
        })
    }

    async fn query<Q: serde::de::DeserializeOwned>(
        &self,
        params: &[(&str, &str)],
    ) -> Result<Option<Q>, reqwest::Error> {
        let response: ApiResponse<Q> = self
            .client
            .get(&self.api_url)
            .query(&[("action", "query"), ("format", "json"), ("formatversion", "2")])
            .query(params)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response.query)
    }

    async fn fetch(&self, query: &str, sentences: usize) -> Result<String, FetchError> {
        let search: Option<SearchQuery> = self
            .query(&[("list", "search"), ("srsearch", query), ("srlimit", "1")])
            .await?;
        let title = match search.and_then(|s| s.search.into_iter().next()) {
            Some(hit) => hit.title,
            None => return Err(FetchError::NotFound),
        };

        let sentences = sentences.to_string();
        let pages: Option<PagesQuery> = self
            .query(&[
                ("prop", "extracts|pageprops"),
                ("exsentences", &sentences),
                ("explaintext", "1"),
                ("redirects", "1"),
                ("ppprop", "disambiguation"),
                ("titles", &title),
            ])
            .await?;
        let page = match pages.and_then(|p| p.pages.into_iter().next()) {
            Some(page) if !page.missing => page,
            _ => return Err(FetchError::NotFound),
        };

        let is_disambiguation = page
            .pageprops
            .as_ref()
            .is_some_and(|p| p.disambiguation.is_some());
        if is_disambiguation {
            return Err(FetchError::Ambiguous(self.options(&page.title).await?));
        }

        match page.extract.map(|e| e.trim().to_string()) {
            Some(extract) if !extract.is_empty() => Ok(extract),
            _ => Err(FetchError::NotFound),
        }
    }

    async fn options(&self, title: &str) -> Result<Vec<String>, reqwest::Error> {
        let limit = MAX_OPTIONS.to_string();
        let pages: Option<PagesQuery> = self
            .query(&[("prop", "links"), ("pllimit", &limit), ("titles", title)])
            .await?;
        Ok(pages
            .and_then(|p| p.pages.into_iter().next())
            .map(|p| p.links.into_iter().take(MAX_OPTIONS).map(|l| l.title).collect())
            .unwrap_or_default())
    }
}

enum FetchError {
    NotFound,
    Ambiguous(Vec<String>),
    Http(reqwest::Error),
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        FetchError::Http(e)
    }
}

#[async_trait]
impl Encyclopedia for WikipediaClient {
    async fn summary(&self, query: &str, sentences: usize) -> Result<String, CapabilityError> {
        match self.fetch(query, sentences).await {
            Ok(text) => Ok(text),
            Err(FetchError::NotFound) => Err(CapabilityError::NotFound),
            Err(FetchError::Ambiguous(options)) => Err(CapabilityError::Ambiguous { options }),
            Err(FetchError::Http(e)) => {
                tracing::error!(query, error = %e, "wikipedia lookup failed");
                Err(CapabilityError::Backend(format!("Error al buscar en Wikipedia: {e}")))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client_for(server: &MockServer) -> WikipediaClient {
        WikipediaClient::new("es", Some(&server.uri()), 5).unwrap()
    }

    #[tokio::test]
    async fn test_summary_on_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/w/api.php"))
            .and(query_param("list", "search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "query": { "search": [{ "title": "Sócrates" }] }
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/w/api.php"))
            .and(query_param("prop", "extracts|pageprops"))
            .and(query_param("exsentences", "3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "query": { "pages": [{ "title": "Sócrates", "extract": "Sócrates fue un filósofo griego." }] }
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        assert_eq!(
            client.summary("socrates", 3).await.unwrap(),
            "Sócrates fue un filósofo griego."
        );
    }

    #[tokio::test]
    async fn test_not_found_when_search_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("list", "search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "query": { "search": [] } })))
            .mount(&server)
            .await;

        let err = client_for(&server).await.summary("xyzzy", 5).await.unwrap_err();
        assert_eq!(err, CapabilityError::NotFound);
    }

    #[tokio::test]
    async fn test_disambiguation_lists_options() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("list", "search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "query": { "search": [{ "title": "Academia" }] }
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("prop", "extracts|pageprops"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "query": { "pages": [{
                    "title": "Academia",
                    "extract": "Academia puede referirse a:",
                    "pageprops": { "disambiguation": "" }
                }] }
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("prop", "links"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "query": { "pages": [{
                    "title": "Academia",
                    "links": [
                        { "title": "Academia de Atenas" },
                        { "title": "Academia platónica" },
                        { "title": "Academia (institución)" }
                    ]
                }] }
            })))
            .mount(&server)
            .await;

        let err = client_for(&server).await.summary("academia", 5).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Tu consulta es ambigua. Tal vez quisiste decir: Academia de Atenas, Academia platónica, Academia (institución)"
        );
    }

    #[tokio::test]
    async fn test_http_fault_becomes_text() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = client_for(&server).await.summary("Platón", 5).await.unwrap_err();
        assert!(err.to_string().starts_with("Error al buscar en Wikipedia:"));
    }

    #[tokio::test]
    async fn test_empty_query_skips_backend() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = lookup(&client, "  ", 5).await.unwrap_err();
        assert_eq!(err.to_string(), "No hay consulta para buscar");
    }
}
