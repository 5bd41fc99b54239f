//! 代理工具模块
//!
//! 每个工具对应一个外部系统：Home Assistant、Node-RED、InfluxDB。
//! 未配置 `base_url` 时工具运行在模拟模式，只返回描述性文本。

use crate::core::models::{BackendConfig, InfluxConfig};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::time::Duration;
use thiserror::Error;

/// 工具调用错误
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("missing argument '{0}'")]
    MissingArgument(String),
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },
}

/// 工具接口
#[async_trait]
pub trait Tool: Send + Sync {
    /// 计划中使用的工具名
    fn name(&self) -> &'static str;

    /// 执行动作；未知动作返回说明文本而不是错误
    async fn execute(&self, action: &str, args: &Map<String, Value>) -> Result<String, ToolError>;
}

/// 读取必填字符串参数
fn required_str<'a>(args: &'a Map<String, Value>, key: &str) -> Result<&'a str, ToolError> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::MissingArgument(key.to_string()))
}

fn optional_str<'a>(args: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    args.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(15))
        .build()
        .unwrap_or_default()
}

fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ToolError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        let body = response.text().await.unwrap_or_default();
        Err(ToolError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

/// Home Assistant 工具
pub struct HomeAssistantTool {
    backend: BackendConfig,
    client: reqwest::Client,
}

impl HomeAssistantTool {
    pub fn new(backend: BackendConfig) -> Self {
        Self {
            backend,
            client: http_client(),
        }
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.backend.token.is_empty() {
            builder
        } else {
            builder.bearer_auth(&self.backend.token)
        }
    }

    async fn entity_state(&self, entity_id: &str) -> Result<String, ToolError> {
        let url = join_url(&self.backend.base_url, &format!("api/states/{}", entity_id));
        let response = self.request(self.client.get(url)).send().await?;
        let state: Value = ensure_success(response).await?.json().await?;

        let value = state.get("state").and_then(Value::as_str).unwrap_or("unknown");
        let unit = state
            .pointer("/attributes/unit_of_measurement")
            .and_then(Value::as_str)
            .map(|u| format!(" {}", u))
            .unwrap_or_default();
        Ok(format!("{} = {}{}", entity_id, value, unit))
    }

    async fn call_service(&self, args: &Map<String, Value>) -> Result<String, ToolError> {
        let domain = required_str(args, "domain")?;
        let service = required_str(args, "service")?;
        let data = args.get("data").cloned().unwrap_or_else(|| Value::Object(Map::new()));

        let url = join_url(
            &self.backend.base_url,
            &format!("api/services/{}/{}", domain, service),
        );
        let response = self.request(self.client.post(url).json(&data)).send().await?;
        let changed: Value = ensure_success(response).await?.json().await?;
        let count = changed.as_array().map(Vec::len).unwrap_or(0);
        Ok(format!(
            "Called service {}.{} ({} state(s) changed)",
            domain, service, count
        ))
    }
}

#[async_trait]
impl Tool for HomeAssistantTool {
    fn name(&self) -> &'static str {
        "home_assistant"
    }

    async fn execute(&self, action: &str, args: &Map<String, Value>) -> Result<String, ToolError> {
        match action {
            "get_entity_state" => {
                let entity_id = required_str(args, "entity_id")?;
                if !self.backend.is_live() {
                    return Ok(format!("[MOCK] HA state for {}", entity_id));
                }
                self.entity_state(entity_id).await
            }
            "call_service" => {
                if !self.backend.is_live() {
                    return Ok(format!("[MOCK] Called service {}", Value::Object(args.clone())));
                }
                self.call_service(args).await
            }
            other => Ok(format!("Unknown HA action: {}", other)),
        }
    }
}

/// Node-RED 工具
pub struct NodeRedTool {
    backend: BackendConfig,
    flow_path: String,
    client: reqwest::Client,
}

impl NodeRedTool {
    pub fn new(backend: BackendConfig, flow_path: String) -> Self {
        Self {
            backend,
            flow_path,
            client: http_client(),
        }
    }
}

#[async_trait]
impl Tool for NodeRedTool {
    fn name(&self) -> &'static str {
        "nodered"
    }

    async fn execute(&self, action: &str, args: &Map<String, Value>) -> Result<String, ToolError> {
        if action != "invoke_flow" {
            return Ok(format!("Unknown Node-RED action: {}", action));
        }

        let payload = Value::Object(args.clone());
        if !self.backend.is_live() {
            return Ok(format!("[MOCK] Node-RED flow invoked: {}", payload));
        }

        let flow_path = optional_str(args, "flow").unwrap_or(&self.flow_path);
        let url = join_url(&self.backend.base_url, flow_path);
        let mut request = self.client.post(url).json(&payload);
        if !self.backend.token.is_empty() {
            request = request.bearer_auth(&self.backend.token);
        }

        let response = ensure_success(request.send().await?).await?;
        Ok(response.text().await?.trim().to_string())
    }
}

/// InfluxDB 工具
pub struct InfluxTool {
    config: InfluxConfig,
    client: reqwest::Client,
}

impl InfluxTool {
    pub fn new(config: InfluxConfig) -> Self {
        Self {
            config,
            client: http_client(),
        }
    }

    /// 构造取最新值的 Flux 查询
    pub fn latest_query(bucket: &str, measurement: Option<&str>, range: &str) -> String {
        let mut flux = format!(
            "from(bucket: \"{}\") |> range(start: {})",
            escape_flux(bucket),
            range
        );
        if let Some(measurement) = measurement {
            flux.push_str(&format!(
                " |> filter(fn: (r) => r._measurement == \"{}\")",
                escape_flux(measurement)
            ));
        }
        flux.push_str(" |> last()");
        flux
    }
}

fn escape_flux(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

#[async_trait]
impl Tool for InfluxTool {
    fn name(&self) -> &'static str {
        "influxdb"
    }

    async fn execute(&self, action: &str, args: &Map<String, Value>) -> Result<String, ToolError> {
        if action != "query_latest" {
            return Ok(format!("Unknown InfluxDB action: {}", action));
        }

        let bucket = required_str(args, "bucket")?;
        if !self.config.backend.is_live() {
            return Ok(format!("[MOCK] Latest data from bucket {}", bucket));
        }

        let range = optional_str(args, "range").unwrap_or(&self.config.default_range);
        let flux = Self::latest_query(bucket, optional_str(args, "measurement"), range);
        tracing::debug!("Flux查询: {}", flux);

        let url = join_url(&self.config.backend.base_url, "api/v2/query");
        let mut request = self
            .client
            .post(url)
            .query(&[("org", self.config.org.as_str())])
            .header("Content-Type", "application/vnd.flux")
            .header("Accept", "application/csv")
            .body(flux);
        if !self.config.backend.token.is_empty() {
            request = request.header("Authorization", format!("Token {}", self.config.backend.token));
        }

        let response = ensure_success(request.send().await?).await?;
        let csv = response.text().await?;
        let csv = csv.trim();
        if csv.is_empty() {
            return Ok(format!("No data in bucket {}", bucket));
        }
        Ok(csv.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, body_string, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn args(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("args must be an object"),
        }
    }

    fn live(server: &MockServer, token: &str) -> BackendConfig {
        BackendConfig {
            base_url: server.uri(),
            token: token.to_string(),
        }
    }

    #[tokio::test]
    async fn test_mock_backends() {
        let ha = HomeAssistantTool::new(BackendConfig::default());
        let out = ha
            .execute("get_entity_state", &args(json!({"entity_id": "switch.pump"})))
            .await
            .unwrap();
        assert_eq!(out, "[MOCK] HA state for switch.pump");

        let out = ha
            .execute("call_service", &args(json!({"domain": "switch"})))
            .await
            .unwrap();
        assert_eq!(out, r#"[MOCK] Called service {"domain":"switch"}"#);

        let out = ha.execute("reboot", &Map::new()).await.unwrap();
        assert_eq!(out, "Unknown HA action: reboot");

        let nodered = NodeRedTool::new(BackendConfig::default(), "oyna/agent".to_string());
        let out = nodered
            .execute("invoke_flow", &args(json!({"query": "hei"})))
            .await
            .unwrap();
        assert_eq!(out, r#"[MOCK] Node-RED flow invoked: {"query":"hei"}"#);
        assert_eq!(
            nodered.execute("deploy", &Map::new()).await.unwrap(),
            "Unknown Node-RED action: deploy"
        );

        let influx = InfluxTool::new(InfluxConfig::default());
        let out = influx
            .execute("query_latest", &args(json!({"bucket": "haos-oyna-waterflow"})))
            .await
            .unwrap();
        assert_eq!(out, "[MOCK] Latest data from bucket haos-oyna-waterflow");
        assert_eq!(
            influx.execute("write", &Map::new()).await.unwrap(),
            "Unknown InfluxDB action: write"
        );
    }

    #[tokio::test]
    async fn test_missing_argument() {
        let ha = HomeAssistantTool::new(BackendConfig::default());
        let err = ha.execute("get_entity_state", &Map::new()).await.unwrap_err();
        assert_eq!(err.to_string(), "missing argument 'entity_id'");

        let influx = InfluxTool::new(InfluxConfig::default());
        let err = influx.execute("query_latest", &Map::new()).await.unwrap_err();
        assert!(matches!(err, ToolError::MissingArgument(ref k) if k == "bucket"));
    }

    #[tokio::test]
    async fn test_home_assistant_live() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/states/sensor.tank_level"))
            .and(header("authorization", "Bearer ha-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "entity_id": "sensor.tank_level",
                "state": "4.2",
                "attributes": {"unit_of_measurement": "m"}
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/services/switch/turn_on"))
            .and(body_json(json!({"entity_id": "switch.pressure_pump_contactor"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"entity_id": "switch.pressure_pump_contactor"}])))
            .mount(&server)
            .await;

        let ha = HomeAssistantTool::new(live(&server, "ha-token"));
        let out = ha
            .execute("get_entity_state", &args(json!({"entity_id": "sensor.tank_level"})))
            .await
            .unwrap();
        assert_eq!(out, "sensor.tank_level = 4.2 m");

        let out = ha
            .execute(
                "call_service",
                &args(json!({
                    "domain": "switch",
                    "service": "turn_on",
                    "data": {"entity_id": "switch.pressure_pump_contactor"}
                })),
            )
            .await
            .unwrap();
        assert_eq!(out, "Called service switch.turn_on (1 state(s) changed)");

        let err = ha
            .execute("get_entity_state", &args(json!({"entity_id": "sensor.unknown"})))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Status { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_nodered_live() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oyna/agent"))
            .and(body_json(json!({"query": "status?"})))
            .respond_with(ResponseTemplate::new(200).set_body_string("Alt normalt\n"))
            .mount(&server)
            .await;

        let nodered = NodeRedTool::new(live(&server, ""), "oyna/agent".to_string());
        let out = nodered
            .execute("invoke_flow", &args(json!({"query": "status?"})))
            .await
            .unwrap();
        assert_eq!(out, "Alt normalt");
    }

    #[test]
    fn test_latest_query() {
        assert_eq!(
            InfluxTool::latest_query("haos-oyna-waterflow", None, "-1h"),
            "from(bucket: \"haos-oyna-waterflow\") |> range(start: -1h) |> last()"
        );
        assert_eq!(
            InfluxTool::latest_query("b", Some("flow\"x"), "-1d"),
            "from(bucket: \"b\") |> range(start: -1d) |> filter(fn: (r) => r._measurement == \"flow\\\"x\") |> last()"
        );
    }

    #[tokio::test]
    async fn test_influx_live() {
        let server = MockServer::start().await;
        let csv = ",result,table,_time,_value\n,_result,0,2024-06-15T12:00:00Z,12.5\n";
        Mock::given(method("POST"))
            .and(path("/api/v2/query"))
            .and(query_param("org", "oyna"))
            .and(header("authorization", "Token influx-token"))
            .and(body_string(InfluxTool::latest_query("haos-oyna-waterflow", None, "-1h")))
            .respond_with(ResponseTemplate::new(200).set_body_string(csv))
            .mount(&server)
            .await;

        let influx = InfluxTool::new(InfluxConfig {
            backend: live(&server, "influx-token"),
            ..Default::default()
        });
        let out = influx
            .execute("query_latest", &args(json!({"bucket": "haos-oyna-waterflow"})))
            .await
            .unwrap();
        assert_eq!(out, csv.trim());
    }
}
