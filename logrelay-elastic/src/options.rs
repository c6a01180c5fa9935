use std::time::Duration;
use url::Url;

use crate::ElasticErr;

pub const DEFAULT_INDEX_PREFIX: &str = "log-";
/// `yyyyMMdd`, in `time` format description syntax.
pub const DEFAULT_INDEX_DATE_FORMAT: &str = "[year][month][day]";
pub const DEFAULT_TEMPLATE_NAME: &str = "logrelay";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct ElasticOptions {
    url: Url,
    api_key: Option<String>,
    index_prefix: String,
    index_date_format: Option<String>,
    template: Option<IndexTemplate>,
    timeout: Duration,
    accept_invalid_certs: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// A composable index template, installed with `PUT _index_template/<name>` unless one exists.
pub struct IndexTemplate {
    pub name: String,
    /// The request body, as JSON.
    pub body: String,
}

impl IndexTemplate {
    /// A template matching every index under `prefix`.
    pub fn for_prefix(name: &str, prefix: &str) -> Self {
        let body = serde_json::json!({
            "index_patterns": [format!("{prefix}*")],
            "template": {
                "mappings": {
                    "properties": {
                        "@timestamp": { "type": "date" },
                        "message": { "type": "text" }
                    }
                }
            }
        });
        Self {
            name: name.to_lowercase(),
            body: body.to_string(),
        }
    }
}

impl ElasticOptions {
    /// Options with the default index naming and template.
    pub fn new(url: Url) -> Self {
        Self {
            url,
            api_key: None,
            index_prefix: DEFAULT_INDEX_PREFIX.to_owned(),
            index_date_format: Some(DEFAULT_INDEX_DATE_FORMAT.to_owned()),
            template: Some(IndexTemplate::for_prefix(
                DEFAULT_TEMPLATE_NAME,
                DEFAULT_INDEX_PREFIX,
            )),
            timeout: DEFAULT_REQUEST_TIMEOUT,
            accept_invalid_certs: false,
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Sent as `Authorization: ApiKey <key>`.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }
    pub fn set_api_key(&mut self, api_key: Option<String>) -> &mut Self {
        self.api_key = api_key;
        self
    }

    pub fn index_prefix(&self) -> &str {
        &self.index_prefix
    }
    pub fn set_index_prefix(&mut self, prefix: String) -> &mut Self {
        self.index_prefix = prefix;
        self
    }

    /// Format of the date suffix of index names. `None` writes everything to one index.
    pub fn index_date_format(&self) -> Option<&str> {
        self.index_date_format.as_deref()
    }
    pub fn set_index_date_format(&mut self, format: Option<String>) -> &mut Self {
        self.index_date_format = format;
        self
    }

    pub fn template(&self) -> Option<&IndexTemplate> {
        self.template.as_ref()
    }
    pub fn set_template(&mut self, template: Option<IndexTemplate>) -> &mut Self {
        self.template = template;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
    pub fn set_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.timeout = timeout;
        self
    }

    pub fn accept_invalid_certs(&self) -> bool {
        self.accept_invalid_certs
    }
    pub fn set_accept_invalid_certs(&mut self, accept: bool) -> &mut Self {
        self.accept_invalid_certs = accept;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), ElasticErr> {
        match self.url.scheme() {
            "http" | "https" => (),
            scheme => {
                return Err(ElasticErr::Config(format!(
                    "unsupported scheme `{scheme}`"
                )))
            }
        }
        if self.index_prefix.is_empty() && self.index_date_format.is_none() {
            return Err(ElasticErr::Config("index name would be empty".to_owned()));
        }
        if let Some(format) = &self.index_date_format {
            time::format_description::parse(format)
                .map_err(|e| ElasticErr::Config(format!("index date format: {e}")))?;
        }
        if let Some(template) = &self.template {
            serde_json::from_str::<serde_json::Value>(&template.body)
                .map_err(|e| ElasticErr::Config(format!("template `{}`: {e}", template.name)))?;
        }
        Ok(())
    }

    /// `<url>/<path>`, keeping any path prefix of the base url.
    pub(crate) fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.url.as_str().trim_end_matches('/'), path)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn options(url: &str) -> ElasticOptions {
        ElasticOptions::new(url.parse().unwrap())
    }

    #[test]
    fn test_validate() {
        assert!(options("http://localhost:9200").validate().is_ok());
        assert!(options("ftp://localhost").validate().is_err());

        let mut opts = options("http://localhost:9200");
        opts.set_index_date_format(Some("[year".to_owned()));
        assert!(opts.validate().is_err());

        let mut opts = options("http://localhost:9200");
        opts.set_index_prefix(String::new()).set_index_date_format(None);
        assert!(opts.validate().is_err());

        let mut opts = options("http://localhost:9200");
        opts.set_template(Some(IndexTemplate {
            name: "t".to_owned(),
            body: "{".to_owned(),
        }));
        assert!(opts.validate().is_err());
    }

    #[test]
    fn test_endpoint() {
        assert_eq!(
            options("http://localhost:9200").endpoint("_bulk"),
            "http://localhost:9200/_bulk"
        );
        assert_eq!(
            options("https://es.internal/proxy/").endpoint("_index_template/logrelay"),
            "https://es.internal/proxy/_index_template/logrelay"
        );
    }

    #[test]
    fn test_default_template() {
        let template = IndexTemplate::for_prefix("LogRelay", "log-");
        assert_eq!(template.name, "logrelay");
        let body: serde_json::Value = serde_json::from_str(&template.body).unwrap();
        assert_eq!(body["index_patterns"][0], "log-*");
    }
}
