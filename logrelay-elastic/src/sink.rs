use reqwest::{header, Client, RequestBuilder, StatusCode};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::{bulk_body, parse_bulk_response, ElasticErr, ElasticOptions, IndexTemplate};
use logrelay_types::{
    export::async_trait, DeliveryPort, DeliveryResult, RecordId, StreamRecord,
};

/// A [`DeliveryPort`] writing records to Elasticsearch with the `_bulk` API.
#[derive(Debug)]
pub struct ElasticSink {
    client: Client,
    options: ElasticOptions,
    template_checked: AtomicBool,
}

impl ElasticSink {
    /// Fails on invalid options; does not contact the cluster.
    pub fn new(options: ElasticOptions) -> Result<Self, ElasticErr> {
        options.validate()?;
        let client = Client::builder()
            .timeout(options.timeout())
            .danger_accept_invalid_certs(options.accept_invalid_certs())
            .build()?;
        Ok(Self {
            client,
            options,
            template_checked: AtomicBool::new(false),
        })
    }

    pub fn options(&self) -> &ElasticOptions {
        &self.options
    }

    fn request(&self, builder: RequestBuilder) -> RequestBuilder {
        match self.options.api_key() {
            Some(key) => builder.header(header::AUTHORIZATION, format!("ApiKey {key}")),
            None => builder,
        }
    }

    /// Install the index template unless one of that name exists.
    pub async fn ensure_template(&self) -> Result<(), ElasticErr> {
        let Some(IndexTemplate { name, body }) = self.options.template() else {
            return Ok(());
        };
        let url = self.options.endpoint(&format!("_index_template/{name}"));
        let res = self.request(self.client.get(&url)).send().await?;
        if res.status().is_success() {
            log::debug!("Index template `{name}` exists");
            return Ok(());
        }
        let res = self
            .request(self.client.put(&url))
            .header(header::CONTENT_TYPE, "application/json")
            .body(body.clone())
            .send()
            .await?;
        check_status(res.status(), res.text().await.unwrap_or_default())?;
        log::info!("Created index template `{name}`");
        Ok(())
    }

    /// One bulk request. Item failures are logged and leave the record unconfirmed.
    pub async fn bulk(&self, records: &[StreamRecord]) -> Result<Vec<RecordId>, ElasticErr> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        let body = bulk_body(
            records,
            self.options.index_prefix(),
            self.options.index_date_format(),
        )?;
        let res = self
            .request(self.client.post(self.options.endpoint("_bulk")))
            .header(header::CONTENT_TYPE, "application/x-ndjson")
            .body(body)
            .send()
            .await?;
        let status = res.status();
        let bytes = res.bytes().await?;
        check_status(status, String::from_utf8_lossy(&bytes).into_owned())?;

        let outcome = parse_bulk_response(&bytes)?;
        for failure in outcome.failed.iter() {
            log::warn!(
                "Elasticsearch refused {} ({}): {}",
                failure.id,
                failure.status,
                failure.reason
            );
        }
        log::debug!(
            "Bulk of {} wrote {}, {} failed",
            records.len(),
            outcome.confirmed.len(),
            outcome.failed.len()
        );
        Ok(outcome.confirmed)
    }
}

fn check_status(status: StatusCode, body: String) -> Result<(), ElasticErr> {
    if status.is_success() {
        Ok(())
    } else {
        Err(ElasticErr::Status {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl DeliveryPort for ElasticSink {
    async fn deliver(&self, records: &[StreamRecord]) -> DeliveryResult<Vec<RecordId>> {
        if !self.template_checked.swap(true, Ordering::SeqCst) {
            if let Err(err) = self.ensure_template().await {
                log::warn!("Failed to install index template: {err}");
            }
        }
        Ok(self.bulk(records).await?)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_new() {
        let options = ElasticOptions::new("http://localhost:9200".parse().unwrap());
        let sink = ElasticSink::new(options).unwrap();
        assert_eq!(sink.options().index_prefix(), "log-");

        let options = ElasticOptions::new("redis://localhost".parse().unwrap());
        assert!(matches!(
            ElasticSink::new(options),
            Err(ElasticErr::Config(_))
        ));
    }

    #[test]
    fn test_check_status() {
        assert!(check_status(StatusCode::OK, String::new()).is_ok());
        let err = check_status(StatusCode::SERVICE_UNAVAILABLE, "down".to_owned()).unwrap_err();
        assert!(err.is_transient());
        assert!(err.to_string().contains("down"));
    }
}
