//! Admission review handler

use crate::api::rest::state::AppState;
use crate::error::{ApiError, ApiResult};
use axum::{
    body::Bytes,
    extract::State,
    http::{header::CONTENT_TYPE, HeaderMap},
    Json,
};
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview};
use kube::core::{DynamicObject, TypeMeta};
use ktest_policy::{admit, AdmissionPolicy, Decision};
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Judge one `AdmissionReview`
///
/// The reply carries the request's `uid` whenever the envelope holds one.
/// Anything that keeps the policy from reaching a verdict (unreadable
/// envelope or objects, a panicking or slow decision) admits the change.
pub async fn admit_review(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<AdmissionReview<DynamicObject>>> {
    if body.is_empty() {
        tracing::error!("Empty admission body");
        return Err(ApiError::BadRequest("empty body".to_string()));
    }
    check_content_type(&headers)?;

    let mut raw: Value = match serde_json::from_slice(&body) {
        Ok(raw) => raw,
        Err(e) => return Ok(Json(undecodable(&Value::Null, e))),
    };

    // The objects are decoded on their own so that one unreadable document
    // cannot take the rest of the envelope down with it.
    let old = take_document(&mut raw, "oldObject");
    let new = take_document(&mut raw, "object");

    let review: AdmissionReview<DynamicObject> = match serde_json::from_value(raw.clone()) {
        Ok(review) => review,
        Err(e) => return Ok(Json(undecodable(&raw, e))),
    };
    let request: AdmissionRequest<DynamicObject> = match review.try_into() {
        Ok(request) => request,
        Err(e) => return Ok(Json(undecodable(&raw, e))),
    };

    let response = AdmissionResponse::from(&request);
    if state.observe_only {
        tracing::info!(uid = %request.uid, "Observe-only mode; admitting without evaluation");
        return Ok(Json(response.into_review()));
    }

    let decision = evaluate(&state, &request.uid, old, new).await;
    if let Some(delay) = decision.delay {
        tokio::time::sleep(delay).await;
    }

    tracing::info!(
        uid = %request.uid,
        operation = ?request.operation,
        namespace = request.namespace.as_deref().unwrap_or_default(),
        name = %request.name,
        allowed = decision.allow,
        "Admission decided"
    );

    Ok(Json(into_response(response, decision).into_review()))
}

/// Run the policy within the decision budget
async fn evaluate(state: &AppState, uid: &str, old: Option<Value>, new: Option<Value>) -> Decision {
    let policy = state.policy.clone();
    let abandoned = Arc::new(AtomicBool::new(false));

    let task = tokio::task::spawn_blocking({
        let abandoned = abandoned.clone();
        let uid = uid.to_string();
        move || decide_unless_abandoned(policy.as_ref(), &abandoned, &uid, old.as_ref(), new.as_ref())
    });

    match tokio::time::timeout(state.decision_timeout, task).await {
        Ok(Ok(Some(decision))) => decision,
        Ok(Ok(None)) => Decision::allow(),
        Ok(Err(e)) => {
            tracing::error!(uid, error = %e, "Decision task failed; admitting");
            Decision::allow()
        }
        Err(_) => {
            abandoned.store(true, Ordering::Release);
            tracing::warn!(
                uid,
                timeout_ms = u64::try_from(state.decision_timeout.as_millis()).unwrap_or(u64::MAX),
                "Decision timed out; admitting"
            );
            Decision::allow()
        }
    }
}

/// Consult the policy unless the request was already admitted by timeout
///
/// A decision already in progress when the request is abandoned still runs
/// to completion; a denial recorded that way is logged.
fn decide_unless_abandoned(
    policy: &dyn AdmissionPolicy,
    abandoned: &AtomicBool,
    uid: &str,
    old: Option<&Value>,
    new: Option<&Value>,
) -> Option<Decision> {
    if abandoned.load(Ordering::Acquire) {
        tracing::debug!(uid, "Request already admitted by timeout; skipping decision");
        return None;
    }

    let decision = admit(policy, old, new);
    if abandoned.load(Ordering::Acquire) && decision.is_denied() {
        tracing::warn!(
            uid,
            "Denial recorded after the request was admitted by timeout"
        );
    }
    Some(decision)
}

/// Remove `request.<field>` from the envelope and return it if readable
///
/// A document that does not decode as an object is logged and dropped, which
/// leaves the policy input incomplete and admits the change.
fn take_document(raw: &mut Value, field: &str) -> Option<Value> {
    let document = raw
        .get_mut("request")
        .and_then(Value::as_object_mut)
        .and_then(|request| request.remove(field))?;
    if document.is_null() {
        return None;
    }

    let object: DynamicObject = match serde_json::from_value(document) {
        Ok(object) => object,
        Err(e) => {
            tracing::warn!(object = field, error = %e, "Can't decode object");
            return None;
        }
    };
    match serde_json::to_value(&object) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(object = field, error = %e, "Can't re-encode object");
            None
        }
    }
}

/// Admit a review whose envelope could not be decoded
///
/// The `uid` and `apiVersion` are echoed when they can be read from `raw`.
fn undecodable(raw: &Value, error: impl fmt::Display) -> AdmissionReview<DynamicObject> {
    tracing::error!(error = %error, "Can't decode admission review; admitting");

    let mut response = AdmissionResponse::invalid(&error);
    response.allowed = true;
    response.result = Default::default();

    if let Some(uid) = raw.pointer("/request/uid").and_then(Value::as_str) {
        response.uid = uid.to_string();
    }
    if let Some(api_version) = raw.get("apiVersion").and_then(Value::as_str) {
        response.types = TypeMeta {
            api_version: api_version.to_string(),
            kind: "AdmissionReview".to_string(),
        };
    }
    response.into_review()
}

fn into_response(response: AdmissionResponse, decision: Decision) -> AdmissionResponse {
    if !decision.allow {
        let reason = decision.reason.unwrap_or_else(|| "denied".to_string());
        return response.deny(reason);
    }

    match decision.patch {
        Some(patch) => match response.clone().with_patch(patch) {
            Ok(patched) => patched,
            Err(e) => {
                tracing::error!(error = %e, "Can't encode patch; admitting without it");
                response
            }
        },
        None => response,
    }
}

fn check_content_type(headers: &HeaderMap) -> ApiResult<()> {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    let media_type = content_type.split(';').next().unwrap_or_default().trim();
    if media_type.eq_ignore_ascii_case("application/json") {
        Ok(())
    } else {
        tracing::error!(content_type, "Unexpected content type, expect application/json");
        Err(ApiError::UnsupportedMediaType(format!(
            "Content-Type={}, expect application/json",
            content_type
        )))
    }
}
