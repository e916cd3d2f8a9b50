//! Initial prompt resolution and alert investigation prompts.

use std::fmt::Write as _;

use serde_json::{Map, Value};

const NO_DESCRIPTION: &str = "no description";
const UNSPECIFIED: &str = "unspecified";

const INVESTIGATION_PREAMBLE: &str = "\
You are an experienced SRE and DevOps engineer with deep knowledge of large distributed systems, \
Kubernetes, cloud-native infrastructure, observability (metrics, logs, traces), incident triage, \
root cause analysis and safe operational runbooks.

When you receive a request, work through the following structure:
1. **Collect data**: query the relevant telemetry (CPU, memory, latency, error rate), logs, traces \
and configuration state. Use the available tools and MCP servers whenever more detail is needed to \
locate the root cause.
2. **Analyse**: identify deviations from the baseline, correlate logs, traces and metrics, locate \
the affected components and quantify the impact.
3. **Hypothesise root causes**: based on the evidence, propose one or more likely root causes, \
concise and actionable.
4. **Recommend actions** as a prioritised plan:
   a. short-term mitigation (restart a pod, scale out, apply a patch)
   b. medium-term fixes (configuration changes, alert tuning, incident review)
   c. preventive measures (SLOs, better observability, chaos testing)
5. **Approval and safe execution**: if an action needs approval (destructive commands, autoscaling, \
production configuration changes), flag the step explicitly, include rollback steps and ask for \
explicit confirmation.
6. **Communicate clearly**: answer the SRE team and stakeholders in concise professional language; \
state what changed, what to monitor and how to verify the fix.

Guidelines:
- Always check the blast radius: which customers or users are affected, and what is the business \
impact (latency, error volume, availability)?
- Always compare against the baseline or golden signals (for example CPU < 60%, error rate < 0.1%, \
p95 latency < 200ms).
- Always correlate across observability dimensions: metrics, logs and traces.
- Prefer evidence over intuition; state any assumption explicitly.
- Keep a safe-operations mindset: rollback plans, non-production impact checks, change windows.
- After resolution, include lessons learned, alert tuning suggestions and longer-term improvements.

**Permissions and limits**:
- No action may violate the production change policy or skip approval.
- If data is missing or ambiguous, ask for more logs, traces or metrics.
- Mark high-risk remediations (schema changes, global restarts) as \"approval required\".

---

**Current investigation request**:
";

const INVESTIGATION_CLOSING: &str =
    "Please investigate the root cause and recommend safe remediation steps.";

/// JavaScript-style truthiness for payload fields.
fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::Array(_) | Value::Object(_)) => true,
    }
}

fn non_empty_str<'a>(payload: &'a Value, key: &str) -> Option<&'a str> {
    payload.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// The payload a request body actually carries.
///
/// Clients may send fields at the top level or nested under `payload`; a
/// nested object wins.
#[must_use]
pub fn resolve_payload(body: &Value) -> &Value {
    match body.get("payload") {
        Some(nested @ Value::Object(_)) => nested,
        _ => body,
    }
}

/// Whether `payload` is a monitoring alert: `source`, `title` and `subject`
/// must all be present and non-empty.
#[must_use]
pub fn is_alert_payload(payload: &Value) -> bool {
    truthy(payload.get("source")) && truthy(payload.get("title")) && truthy(payload.get("subject"))
}

/// Model named by the payload, if any.
#[must_use]
pub fn requested_model(payload: &Value) -> Option<&str> {
    non_empty_str(payload, "model")
}

/// First non-empty of `input`, `message`, `text`.
#[must_use]
pub fn initial_user_input(payload: &Value) -> Option<String> {
    ["input", "message", "text"]
        .iter()
        .find_map(|key| match payload.get(*key) {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        })
}

/// The instruction sent as the first turn: a composed investigation prompt
/// for alerts, else the plain user input.
#[must_use]
pub fn initial_prompt(payload: &Value) -> Option<String> {
    if is_alert_payload(payload) {
        Some(compose_alert_prompt(payload))
    } else {
        initial_user_input(payload)
    }
}

fn append_fields(prompt: &mut String, heading: &str, fields: &Map<String, Value>) {
    let _ = writeln!(prompt, "**{heading}**");
    for (key, value) in fields {
        let _ = writeln!(prompt, "{key}: {}", display_value(value));
    }
    prompt.push('\n');
}

/// Compose the investigation instruction for an alert payload.
///
/// The prompt names the alert (description, falling back to title), the
/// time range from `context.start_timestamp`/`context.end_timestamp`, then
/// lists every `subject` and `context` field.
#[must_use]
pub fn compose_alert_prompt(payload: &Value) -> String {
    let description = non_empty_str(payload, "description")
        .or_else(|| non_empty_str(payload, "title"))
        .unwrap_or(NO_DESCRIPTION);
    let context = payload.get("context").and_then(Value::as_object);
    let timestamp = |key: &str| {
        context
            .and_then(|ctx| ctx.get(key))
            .filter(|v| truthy(Some(v)))
            .map_or_else(|| UNSPECIFIED.to_owned(), display_value)
    };

    let mut prompt = String::from(INVESTIGATION_PREAMBLE);
    let _ = writeln!(prompt, "Alert: {description}");
    let _ = writeln!(
        prompt,
        "Time range: {} to {}",
        timestamp("start_timestamp"),
        timestamp("end_timestamp")
    );
    prompt.push('\n');

    if let Some(subject) = payload.get("subject").and_then(Value::as_object) {
        append_fields(&mut prompt, "Subject details", subject);
    }
    if let Some(context) = context {
        append_fields(&mut prompt, "Context details", context);
    }

    prompt.push_str(INVESTIGATION_CLOSING);
    prompt
}
