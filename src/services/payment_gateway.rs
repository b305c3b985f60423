use crate::{config::PaymentGatewayConfig, errors::ServiceError};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, Utc};
use metrics::counter;
use rsa::{
    pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey},
    pkcs1v15::{Signature, SigningKey, VerifyingKey},
    pkcs8::{DecodePrivateKey, DecodePublicKey},
    signature::{SignatureEncoding, Signer, Verifier},
    RsaPrivateKey, RsaPublicKey,
};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::Sha512;
use std::time::Duration;
use tracing::{error, info, instrument};
use uuid::Uuid;

/// Timestamp layout PayWay expects in `req_time`
const REQ_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// QR payload issued by the processor for one order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QrCode {
    pub qr_code: String,
}

/// Fields of a processor callback that are covered by its signature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub tran_id: String,
    pub apv: String,
    pub status: String,
}

#[derive(Deserialize)]
struct RawCallback {
    tran_id: Option<Value>,
    #[serde(rename = "orderId")]
    order_id: Option<Value>,
    apv: Option<Value>,
    status: Option<Value>,
}

fn scalar_to_string(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl WebhookPayload {
    /// Parses a callback body. `tran_id` falls back to `orderId`; numeric
    /// fields are rendered the way they appear in the signed string.
    pub fn parse(body: &[u8]) -> Option<Self> {
        let raw: RawCallback = serde_json::from_slice(body).ok()?;
        let tran_id = raw
            .tran_id
            .or(raw.order_id)
            .and_then(scalar_to_string)?;
        let status = raw.status.and_then(scalar_to_string)?;
        let apv = raw.apv.and_then(scalar_to_string).unwrap_or_default();
        Some(Self {
            tran_id,
            apv,
            status,
        })
    }

    /// `"success"` or the processor's numeric success code `0`
    pub fn reports_success(&self) -> bool {
        self.status.eq_ignore_ascii_case("success") || self.status == "0"
    }
}

/// Push-payment processor seam
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Requests a scannable QR bound to `(order_id, amount)`.
    async fn generate_qr_code(&self, order_id: Uuid, amount: Decimal)
        -> Result<QrCode, ServiceError>;

    /// Checks a callback signature. Never errors; `false` means reject.
    fn verify_webhook_signature(&self, payload: &WebhookPayload, signature: &str) -> bool;
}

/// Formats an amount with exactly two decimals, rounding half away from zero.
///
/// The processor signs this string, so the output must be byte-stable.
pub fn format_amount(amount: Decimal) -> String {
    let mut rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);
    rounded.to_string()
}

/// `req_time ‖ merchant_id ‖ public_api_key ‖ tran_id ‖ amount`
pub fn qr_canonical_string(
    req_time: &str,
    merchant_id: &str,
    public_api_key: &str,
    tran_id: &str,
    amount: &str,
) -> String {
    format!("{req_time}{merchant_id}{public_api_key}{tran_id}{amount}")
}

/// `tran_id ‖ apv ‖ status`
pub fn webhook_canonical_string(payload: &WebhookPayload) -> String {
    format!("{}{}{}", payload.tran_id, payload.apv, payload.status)
}

/// Signs `message` with RSASSA-PKCS1-v1_5 / SHA-512 and encodes it as standard base64.
pub fn sign_base64(key: &RsaPrivateKey, message: &str) -> String {
    let signing_key = SigningKey::<Sha512>::new(key.clone());
    BASE64.encode(signing_key.sign(message.as_bytes()).to_bytes())
}

/// Restores newlines in PEM values that were flattened into one env-var line.
fn normalize_pem(pem: &str) -> String {
    pem.replace("\\n", "\n").trim().to_string()
}

fn parse_private_key(pem: &str) -> Result<RsaPrivateKey, ServiceError> {
    let pem = normalize_pem(pem);
    RsaPrivateKey::from_pkcs8_pem(&pem)
        .or_else(|_| RsaPrivateKey::from_pkcs1_pem(&pem))
        .map_err(|e| {
            ServiceError::ConfigurationError(format!("invalid merchant private key: {e}"))
        })
}

fn parse_public_key(pem: &str) -> Result<RsaPublicKey, ServiceError> {
    let pem = normalize_pem(pem);
    RsaPublicKey::from_public_key_pem(&pem)
        .or_else(|_| RsaPublicKey::from_pkcs1_pem(&pem))
        .map_err(|e| {
            ServiceError::ConfigurationError(format!("invalid processor public key: {e}"))
        })
}

/// Body of `POST /payments/purchase`
#[derive(Debug, Clone, Serialize)]
pub struct PurchaseRequest {
    pub merchant_id: String,
    pub apikey: String,
    pub req_time: String,
    pub tran_id: String,
    pub amount: String,
    pub items: Vec<Value>,
    pub hash: String,
}

#[derive(Debug, Default, Deserialize)]
struct PurchaseResponse {
    qr_code: Option<String>,
    description: Option<String>,
    message: Option<String>,
}

impl PurchaseResponse {
    fn processor_message(&self) -> Option<String> {
        self.description
            .clone()
            .or_else(|| self.message.clone())
            .filter(|m| !m.trim().is_empty())
    }
}

/// PayWay (ABA) KHQR adapter
#[derive(Clone)]
pub struct PayWayGateway {
    client: reqwest::Client,
    purchase_url: String,
    merchant_id: String,
    public_api_key: String,
    signing_key: RsaPrivateKey,
    processor_key: VerifyingKey<Sha512>,
}

impl std::fmt::Debug for PayWayGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PayWayGateway")
            .field("purchase_url", &self.purchase_url)
            .field("merchant_id", &self.merchant_id)
            .finish_non_exhaustive()
    }
}

impl PayWayGateway {
    /// Builds the adapter, rejecting absent or unparsable credentials.
    pub fn from_config(config: &PaymentGatewayConfig) -> Result<Self, ServiceError> {
        let missing: Vec<&str> = [
            ("api_url", &config.api_url),
            ("merchant_id", &config.merchant_id),
            ("public_api_key", &config.public_api_key),
            ("private_key_pem", &config.private_key_pem),
            ("processor_public_key_pem", &config.processor_public_key_pem),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect();

        if !missing.is_empty() {
            return Err(ServiceError::ConfigurationError(format!(
                "missing payment gateway settings: {}",
                missing.join(", ")
            )));
        }

        let signing_key = parse_private_key(&config.private_key_pem)?;
        let processor_key =
            VerifyingKey::<Sha512>::new(parse_public_key(&config.processor_public_key_pem)?);

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| {
                ServiceError::ConfigurationError(format!("failed to build HTTP client: {e}"))
            })?;

        info!(merchant_id = %config.merchant_id, "PayWay gateway configured");

        Ok(Self {
            client,
            purchase_url: format!("{}/payments/purchase", config.api_url.trim_end_matches('/')),
            merchant_id: config.merchant_id.trim().to_string(),
            public_api_key: config.public_api_key.trim().to_string(),
            signing_key,
            processor_key,
        })
    }

    /// Builds the signed purchase request for `order_id` at `now`.
    pub fn purchase_request(
        &self,
        order_id: Uuid,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> PurchaseRequest {
        let req_time = now.format(REQ_TIME_FORMAT).to_string();
        let tran_id = order_id.to_string();
        let amount = format_amount(amount);
        let canonical = qr_canonical_string(
            &req_time,
            &self.merchant_id,
            &self.public_api_key,
            &tran_id,
            &amount,
        );

        PurchaseRequest {
            merchant_id: self.merchant_id.clone(),
            apikey: self.public_api_key.clone(),
            req_time,
            tran_id,
            amount,
            items: Vec::new(),
            hash: sign_base64(&self.signing_key, &canonical),
        }
    }

    fn unavailable(&self, order_id: Uuid, reason: String) -> ServiceError {
        error!(order_id = %order_id, reason = %reason, "PayWay API error");
        counter!("storefront.gateway.failures", 1);
        ServiceError::GatewayUnavailable(reason)
    }
}

#[async_trait]
impl PaymentGateway for PayWayGateway {
    #[instrument(skip_all, fields(order_id = %order_id, amount = %amount))]
    async fn generate_qr_code(
        &self,
        order_id: Uuid,
        amount: Decimal,
    ) -> Result<QrCode, ServiceError> {
        let request = self.purchase_request(order_id, amount, Utc::now());

        let response = self
            .client
            .post(&self.purchase_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.unavailable(order_id, format!("request failed: {e}")))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| self.unavailable(order_id, format!("failed to read response: {e}")))?;
        let parsed: PurchaseResponse = serde_json::from_slice(&body).unwrap_or_default();

        if !status.is_success() {
            let reason = parsed
                .processor_message()
                .unwrap_or_else(|| format!("processor returned HTTP {status}"));
            return Err(self.unavailable(order_id, reason));
        }

        match parsed.qr_code.clone().filter(|qr| !qr.is_empty()) {
            Some(qr_code) => {
                info!(order_id = %order_id, "QR code issued");
                Ok(QrCode { qr_code })
            }
            None => {
                let reason = parsed
                    .processor_message()
                    .unwrap_or_else(|| "response did not include a qr_code".to_string());
                Err(self.unavailable(order_id, reason))
            }
        }
    }

    fn verify_webhook_signature(&self, payload: &WebhookPayload, signature: &str) -> bool {
        let Ok(bytes) = BASE64.decode(signature.trim()) else {
            return false;
        };
        let Ok(signature) = Signature::try_from(bytes.as_slice()) else {
            return false;
        };
        self.processor_key
            .verify(webhook_canonical_string(payload).as_bytes(), &signature)
            .is_ok()
    }
}


#[cfg(test)]
mod tests {
    use super::test_keys::*;
    use super::*;
    use assert_matches::assert_matches;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(api_url: &str) -> PaymentGatewayConfig {
        PaymentGatewayConfig {
            api_url: api_url.to_string(),
            merchant_id: "ec000123".into(),
            public_api_key: "pub-api-key".into(),
            private_key_pem: private_pem(&MERCHANT_KEY),
            processor_public_key_pem: public_pem(&PROCESSOR_KEY),
            request_timeout_secs: 5,
        }
    }

    fn gateway(api_url: &str) -> PayWayGateway {
        PayWayGateway::from_config(&config(api_url)).expect("gateway builds")
    }

    fn signed_callback(tran_id: &str, apv: &str, status: &str) -> (WebhookPayload, String) {
        let payload = WebhookPayload {
            tran_id: tran_id.into(),
            apv: apv.into(),
            status: status.into(),
        };
        let signature = sign_base64(&PROCESSOR_KEY, &webhook_canonical_string(&payload));
        (payload, signature)
    }

    #[test]
    fn amounts_always_have_two_decimals() {
        assert_eq!(format_amount(dec!(100)), "100.00");
        assert_eq!(format_amount(dec!(25.5)), "25.50");
        assert_eq!(format_amount(dec!(0.004)), "0.00");
    }

    #[test]
    fn amounts_round_half_away_from_zero() {
        assert_eq!(format_amount(dec!(1.005)), "1.01");
        assert_eq!(format_amount(dec!(2.345)), "2.35");
        assert_eq!(format_amount(dec!(2.344)), "2.34");
    }

    proptest! {
        #[test]
        fn whole_cent_amounts_format_exactly(cents in 0i64..100_000_000) {
            let formatted = format_amount(Decimal::new(cents, 2));
            prop_assert_eq!(formatted, format!("{}.{:02}", cents / 100, cents % 100));
        }

        #[test]
        fn rounding_moves_less_than_half_a_cent(mills in 0i64..100_000_000) {
            let amount = Decimal::new(mills, 3);
            let formatted: Decimal = format_amount(amount).parse().unwrap();
            prop_assert!((formatted - amount).abs() <= dec!(0.005));
        }
    }

    #[test]
    fn missing_credentials_are_named() {
        let mut cfg = config("https://payway.test");
        cfg.merchant_id = String::new();
        cfg.private_key_pem = "  ".into();

        let err = PayWayGateway::from_config(&cfg).unwrap_err();
        assert_matches!(err, ServiceError::ConfigurationError(msg) => {
            assert!(msg.contains("merchant_id"));
            assert!(msg.contains("private_key_pem"));
        });
    }

    #[test]
    fn malformed_key_is_a_configuration_error() {
        let mut cfg = config("https://payway.test");
        cfg.processor_public_key_pem = "-----BEGIN PUBLIC KEY-----\nnope\n-----END PUBLIC KEY-----".into();
        assert_matches!(
            PayWayGateway::from_config(&cfg),
            Err(ServiceError::ConfigurationError(_))
        );
    }

    #[test]
    fn escaped_newlines_in_pem_are_accepted() {
        let mut cfg = config("https://payway.test");
        cfg.private_key_pem = private_pem(&MERCHANT_KEY).replace('\n', "\\n");
        assert!(PayWayGateway::from_config(&cfg).is_ok());
    }

    #[test]
    fn purchase_request_is_signed_over_canonical_string() {
        let gw = gateway("https://payway.test/api/");
        let order_id = Uuid::new_v4();
        let now = DateTime::parse_from_rfc3339("2025-03-01T08:15:30.123Z")
            .unwrap()
            .with_timezone(&Utc);

        let request = gw.purchase_request(order_id, dec!(100), now);
        assert_eq!(request.req_time, "2025-03-01T08:15:30Z");
        assert_eq!(request.amount, "100.00");
        assert_eq!(request.tran_id, order_id.to_string());
        assert!(request.items.is_empty());
        assert_eq!(gw.purchase_url, "https://payway.test/api/payments/purchase");

        let canonical = format!("2025-03-01T08:15:30Zec000123pub-api-key{order_id}100.00");
        let signature =
            Signature::try_from(BASE64.decode(&request.hash).unwrap().as_slice()).unwrap();
        let merchant_public = VerifyingKey::<Sha512>::new(MERCHANT_KEY.to_public_key());
        assert!(merchant_public
            .verify(canonical.as_bytes(), &signature)
            .is_ok());
    }

    #[test]
    fn webhook_signature_round_trip() {
        let gw = gateway("https://payway.test");
        let (payload, signature) = signed_callback("order-1", "APV123", "success");
        assert!(gw.verify_webhook_signature(&payload, &signature));
    }

    #[test]
    fn tampered_or_garbage_signatures_are_rejected() {
        let gw = gateway("https://payway.test");
        let (mut payload, signature) = signed_callback("order-1", "APV123", "pending");
        payload.status = "success".into();
        assert!(!gw.verify_webhook_signature(&payload, &signature));
        assert!(!gw.verify_webhook_signature(&payload, "not base64 !!"));
        assert!(!gw.verify_webhook_signature(&payload, ""));

        // signed by the merchant key instead of the processor key
        let forged = sign_base64(&MERCHANT_KEY, &webhook_canonical_string(&payload));
        assert!(!gw.verify_webhook_signature(&payload, &forged));
    }

    #[test]
    fn callback_parsing_accepts_both_id_fields() {
        let parsed = WebhookPayload::parse(br#"{"tran_id":"abc","apv":"111","status":0}"#).unwrap();
        assert_eq!(parsed.status, "0");
        assert!(parsed.reports_success());

        let parsed = WebhookPayload::parse(br#"{"orderId":"xyz","status":"success"}"#).unwrap();
        assert_eq!(parsed.tran_id, "xyz");
        assert_eq!(parsed.apv, "");

        assert!(WebhookPayload::parse(b"not json").is_none());
        assert!(WebhookPayload::parse(br#"{"status":"success"}"#).is_none());
        assert!(!WebhookPayload::parse(br#"{"tran_id":"a","status":"failed"}"#)
            .unwrap()
            .reports_success());
    }

    #[tokio::test]
    async fn qr_code_is_returned_from_processor() {
        let server = MockServer::start().await;
        let order_id = Uuid::new_v4();
        Mock::given(method("POST"))
            .and(path("/payments/purchase"))
            .and(body_partial_json(json!({
                "merchant_id": "ec000123",
                "apikey": "pub-api-key",
                "tran_id": order_id.to_string(),
                "amount": "100.00",
                "items": [],
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"qr_code": "KHQR-PAYLOAD"})))
            .expect(1)
            .mount(&server)
            .await;

        let qr = gateway(&server.uri())
            .generate_qr_code(order_id, dec!(100.00))
            .await
            .unwrap();
        assert_eq!(qr.qr_code, "KHQR-PAYLOAD");
    }

    #[tokio::test]
    async fn processor_errors_surface_their_description() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/payments/purchase"))
            .respond_with(
                ResponseTemplate::new(403).set_body_json(json!({"description": "Wrong hash"})),
            )
            .mount(&server)
            .await;

        let err = gateway(&server.uri())
            .generate_qr_code(Uuid::new_v4(), dec!(10))
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::GatewayUnavailable(msg) if msg == "Wrong hash");
    }

    #[tokio::test]
    async fn success_without_qr_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "queued"})))
            .mount(&server)
            .await;

        let err = gateway(&server.uri())
            .generate_qr_code(Uuid::new_v4(), dec!(10))
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::GatewayUnavailable(msg) if msg == "queued");
    }

    #[tokio::test]
    async fn unreachable_processor_is_unavailable() {
        let err = gateway("http://127.0.0.1:9")
            .generate_qr_code(Uuid::new_v4(), dec!(10))
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::GatewayUnavailable(_));
    }
}
