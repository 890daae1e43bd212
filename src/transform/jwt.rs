//! Bearer-token transforms. The gateway never validates signatures; it only
//! forwards tokens and projects claims into headers.

use crate::message::context::BufferedContext;
use crate::transform::params::TransformParams;
use crate::transform::{BufferedTransform, TransformError};
use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::Value as JsonValue;
use tokio_util::sync::CancellationToken;

fn bearer_token(headers_value: &str) -> Option<&str> {
    let (scheme, token) = headers_value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Decodes the claims object of a compact JWS without verifying it. Returns
/// `None` for anything malformed.
fn decode_claims(token: &str) -> Option<JsonValue> {
    let mut parts = token.split('.');
    let _header = parts.next()?;
    let payload = parts.next()?;
    let _signature = parts.next()?;
    if parts.next().is_some() {
        return None;
    }
    let decoded = URL_SAFE_NO_PAD.decode(payload).ok()?;
    let claims: JsonValue = serde_json::from_slice(&decoded).ok()?;
    claims.is_object().then_some(claims)
}

fn claim_to_string(claim: &JsonValue) -> Option<String> {
    match claim {
        JsonValue::String(text) => Some(text.clone()),
        JsonValue::Number(number) => Some(number.to_string()),
        JsonValue::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

/// Leaves the Authorization header untouched; exists so token passthrough is
/// visible in traces.
#[derive(Default)]
pub struct JwtForward;

impl JwtForward {
    pub const NAME: &'static str = "jwt-forward";

    pub fn from_params(_params: &TransformParams) -> Result<Self, TransformError> {
        Ok(Self)
    }
}

#[async_trait]
impl BufferedTransform for JwtForward {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn should_apply(&self, ctx: &BufferedContext<'_>) -> bool {
        ctx.headers().contains("Authorization")
    }

    async fn apply(
        &self,
        _ctx: &mut BufferedContext<'_>,
        _cancel: &CancellationToken,
    ) -> Result<(), TransformError> {
        tracing::debug!(
            target: "reqrep::transform",
            event = "jwt_forwarded",
            transform = Self::NAME,
        );
        Ok(())
    }
}

/// Projects claims from the bearer token into headers according to a
/// `claim=Header` map. Malformed or absent tokens are skipped silently.
pub struct JwtClaimsExtract {
    claim_map: Vec<(String, String)>,
}

impl JwtClaimsExtract {
    pub const NAME: &'static str = "jwt-claims-extract";

    pub fn from_params(params: &TransformParams) -> Result<Self, TransformError> {
        params.require_string("claimMap")?;
        let claim_map = params.pair_map("claimMap");
        if claim_map.is_empty() {
            return Err(TransformError::invalid(
                "claimMap",
                "expected `claim=Header|claim=Header` pairs",
            ));
        }
        Ok(Self { claim_map })
    }
}

#[async_trait]
impl BufferedTransform for JwtClaimsExtract {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn should_apply(&self, ctx: &BufferedContext<'_>) -> bool {
        ctx.headers().contains("Authorization")
    }

    async fn apply(
        &self,
        ctx: &mut BufferedContext<'_>,
        _cancel: &CancellationToken,
    ) -> Result<(), TransformError> {
        let token = ctx
            .headers()
            .get("Authorization")
            .and_then(bearer_token)
            .map(str::to_string);

        let Some(token) = token else {
            return Ok(());
        };

        let Some(claims) = decode_claims(&token) else {
            tracing::debug!(
                target: "reqrep::transform",
                event = "jwt_claims_skipped",
                transform = Self::NAME,
                reason = "malformed token",
            );
            return Ok(());
        };

        for (claim, header) in &self.claim_map {
            if let Some(value) = claims.get(claim).and_then(claim_to_string) {
                ctx.headers_mut().set(header.clone(), value);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn encode_unsigned_token(claims: &JsonValue) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string().as_bytes());
    format!("{header}.{payload}.sig")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_bearer_tokens_only() {
        assert_eq!(bearer_token("Bearer abc.def.ghi"), Some("abc.def.ghi"));
        assert_eq!(bearer_token("bearer t"), Some("t"));
        assert_eq!(bearer_token("Basic dXNlcg=="), None);
        assert_eq!(bearer_token("Bearer "), None);
    }

    #[test]
    fn decodes_claims_from_compact_token() {
        let token = encode_unsigned_token(&json!({"sub":"u123","email":"a@b"}));
        let claims = decode_claims(&token).expect("claims should decode");
        assert_eq!(claims["sub"], json!("u123"));
    }

    #[test]
    fn malformed_tokens_decode_to_none() {
        assert!(decode_claims("only-one-part").is_none());
        assert!(decode_claims("a.!!!.c").is_none());
        assert!(decode_claims("a.b.c.d").is_none());
    }
}
