use crate::config::SalesforceConfig;
use crate::records::{CaseStore, RecordError};
use crate::types::{CaseDraft, CaseUpdate, RemoteCaseRecord};
use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, info};

const HTTP_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone, PartialEq)]
struct LoginSession {
    session_id: String,
    instance_url: String,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    records: Vec<RemoteCaseRecord>,
    #[serde(default = "default_done")]
    done: bool,
    #[serde(rename = "nextRecordsUrl", default)]
    next_records_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreateResponse {
    id: String,
}

fn default_done() -> bool {
    true
}

/// Salesforce REST client for the `Case` object.
///
/// Authenticates once through the SOAP partner login (password with the
/// security token appended) and reuses the session for every REST call.
#[derive(Debug, Clone)]
pub struct SalesforceClient {
    client: Client,
    session_id: String,
    instance_url: String,
    api_version: String,
}

impl SalesforceClient {
    pub async fn login(cfg: &SalesforceConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .context("failed to build salesforce http client")?;

        let url = format!(
            "{}/services/Soap/u/{}",
            cfg.login_url.trim_end_matches('/'),
            cfg.api_version
        );
        let password = format!("{}{}", cfg.password, cfg.security_token);
        let envelope = login_envelope(&cfg.username, &password);

        info!(login_url = %cfg.login_url, "salesforce: logging in");
        let response = client
            .post(&url)
            .header("Content-Type", "text/xml; charset=UTF-8")
            .header("SOAPAction", "login")
            .body(envelope)
            .send()
            .await
            .context("failed to reach salesforce login endpoint")?;

        let status = response.status();
        let text = response
            .text()
            .await
            .context("failed to read salesforce login response")?;
        if !status.is_success() {
            let fault = extract_tag(&text, "faultstring").unwrap_or(&text);
            bail!("salesforce login failed ({status}): {fault}");
        }

        let session = parse_login_response(&text)?;
        info!(instance = %session.instance_url, "salesforce: logged in");
        Ok(Self {
            client,
            session_id: session.session_id,
            instance_url: session.instance_url,
            api_version: cfg.api_version.clone(),
        })
    }

    fn data_url(&self, path: &str) -> String {
        format!(
            "{}/services/data/v{}/{}",
            self.instance_url, self.api_version, path
        )
    }

    fn case_url(&self, id: &str) -> String {
        self.data_url(&format!("sobjects/Case/{id}"))
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, RecordError> {
        let response = request
            .bearer_auth(&self.session_id)
            .send()
            .await
            .map_err(|err| RecordError::Transport(err.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        if status.is_server_error() {
            Err(RecordError::Transport(format!("{status}: {message}")))
        } else {
            Err(RecordError::Rejected {
                status: status.as_u16(),
                message,
            })
        }
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, RecordError> {
        let response = self.send(request).await?;
        let body = response
            .bytes()
            .await
            .map_err(|err| RecordError::Malformed(format!("failed to read response: {err}")))?;
        decode_body(&body)
    }
}

/// Decodes a 2xx response body. Failures are never transient: the request
/// itself was accepted.
fn decode_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, RecordError> {
    serde_json::from_slice(body)
        .map_err(|err| RecordError::Malformed(format!("failed to parse response: {err}")))
}

#[async_trait]
impl CaseStore for SalesforceClient {
    async fn query_all(&self, soql: &str) -> Result<Vec<RemoteCaseRecord>, RecordError> {
        let mut page: QueryResponse = self
            .send_json(self.client.get(self.data_url("query")).query(&[("q", soql)]))
            .await?;
        let mut records = std::mem::take(&mut page.records);
        while !page.done {
            let Some(next) = page.next_records_url.take() else {
                break;
            };
            debug!(next = %next, "salesforce: fetching next query page");
            page = self
                .send_json(self.client.get(format!("{}{next}", self.instance_url)))
                .await?;
            records.append(&mut page.records);
        }
        Ok(records)
    }

    async fn query(&self, soql: &str) -> Result<Vec<RemoteCaseRecord>, RecordError> {
        let page: QueryResponse = self
            .send_json(self.client.get(self.data_url("query")).query(&[("q", soql)]))
            .await?;
        Ok(page.records)
    }

    async fn create(&self, draft: &CaseDraft) -> Result<String, RecordError> {
        let created: CreateResponse = self
            .send_json(self.client.post(self.data_url("sobjects/Case/")).json(draft))
            .await?;
        Ok(created.id)
    }

    async fn update(&self, id: &str, update: &CaseUpdate) -> Result<(), RecordError> {
        self.send(self.client.patch(self.case_url(id)).json(update))
            .await?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), RecordError> {
        self.send(self.client.delete(self.case_url(id))).await?;
        Ok(())
    }
}

fn login_envelope(username: &str, password: &str) -> String {
    format!(
        concat!(
            r#"<?xml version="1.0" encoding="utf-8" ?>"#,
            r#"<env:Envelope xmlns:xsd="http://www.w3.org/2001/XMLSchema" "#,
            r#"xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" "#,
            r#"xmlns:env="http://schemas.xmlsoap.org/soap/envelope/" "#,
            r#"xmlns:urn="urn:partner.soap.sforce.com">"#,
            "<env:Body><urn:login>",
            "<urn:username>{}</urn:username>",
            "<urn:password>{}</urn:password>",
            "</urn:login></env:Body></env:Envelope>"
        ),
        xml_escape(username),
        xml_escape(password)
    )
}

fn xml_escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(ch),
        }
    }
    out
}

fn extract_tag<'a>(xml: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = xml.find(&open)? + open.len();
    let end = xml[start..].find(&close)? + start;
    Some(&xml[start..end])
}

fn parse_login_response(xml: &str) -> Result<LoginSession> {
    let session_id = extract_tag(xml, "sessionId")
        .ok_or_else(|| anyhow!("salesforce login response has no sessionId"))?;
    let server_url = extract_tag(xml, "serverUrl")
        .ok_or_else(|| anyhow!("salesforce login response has no serverUrl"))?;
    let instance_url = instance_root(server_url)
        .with_context(|| format!("unexpected serverUrl: {server_url}"))?;
    Ok(LoginSession {
        session_id: session_id.to_string(),
        instance_url: instance_url.to_string(),
    })
}

/// `https://host/services/Soap/...` -> `https://host`
fn instance_root(server_url: &str) -> Option<&str> {
    let scheme_end = server_url.find("://")? + 3;
    match server_url[scheme_end..].find('/') {
        Some(path_start) => Some(&server_url[..scheme_end + path_start]),
        None => Some(server_url),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOGIN_RESPONSE: &str = concat!(
        r#"<?xml version="1.0" encoding="UTF-8"?><soapenv:Envelope><soapenv:Body>"#,
        "<loginResponse><result>",
        "<serverUrl>https://acme.my.salesforce.com/services/Soap/u/59.0/00D000000000001</serverUrl>",
        "<sessionId>00D!AQ0AQ.session</sessionId>",
        "</result></loginResponse></soapenv:Body></soapenv:Envelope>"
    );

    #[test]
    fn parses_session_and_instance() {
        let session = parse_login_response(LOGIN_RESPONSE).unwrap();
        assert_eq!(session.session_id, "00D!AQ0AQ.session");
        assert_eq!(session.instance_url, "https://acme.my.salesforce.com");
    }

    #[test]
    fn missing_session_is_an_error() {
        let err = parse_login_response("<result></result>").unwrap_err();
        assert!(err.to_string().contains("sessionId"));
    }

    #[test]
    fn credentials_are_escaped() {
        let envelope = login_envelope("ops@example.com", "p<&>ss");
        assert!(envelope.contains("<urn:username>ops@example.com</urn:username>"));
        assert!(envelope.contains("<urn:password>p&lt;&amp;&gt;ss</urn:password>"));
    }

    #[test]
    fn query_page_defaults() {
        let page: QueryResponse = serde_json::from_str(
            r#"{"totalSize":1,"records":[{"Id":"500A","Description":"d"}]}"#,
        )
        .unwrap();
        assert!(page.done);
        assert!(page.next_records_url.is_none());
        assert_eq!(page.records[0].description.as_deref(), Some("d"));
    }

    #[test]
    fn truncated_create_body_is_not_transient() {
        let err = decode_body::<CreateResponse>(br#"{"id":"500A","succ"#).unwrap_err();
        assert!(matches!(err, RecordError::Malformed(_)));
        assert!(!err.is_transient());

        let created: CreateResponse =
            decode_body(br#"{"id":"500A","success":true,"errors":[]}"#).unwrap();
        assert_eq!(created.id, "500A");
    }

    #[test]
    fn instance_root_without_path() {
        assert_eq!(instance_root("https://host"), Some("https://host"));
        assert_eq!(instance_root("nope"), None);
    }
}
