use super::types::{Script, ScriptStep};

/// The opaque values produced during plan resolution / flow execution,
/// consumed when expanding a [`Script`]'s placeholders.
#[derive(Debug, Clone, Default)]
pub struct Context {
    pub authorize_url: Option<String>,
    pub pkce_verifier: Option<String>,
    pub state: Option<String>,
    pub redirect_uri: Option<String>,
    pub device_code: Option<String>,
    pub user_code: Option<String>,
    pub verification_uri: Option<String>,
    pub verification_uri_complete: Option<String>,
    pub interval: Option<u64>,
    pub expires_in: Option<u64>,
}

impl Context {
    fn placeholder(&self, name: &str) -> Option<String> {
        match name {
            "authorize_url" => self.authorize_url.clone(),
            "pkce_verifier" => self.pkce_verifier.clone(),
            "state" => self.state.clone(),
            "redirect_uri" => self.redirect_uri.clone(),
            "device_code" => self.device_code.clone(),
            "user_code" => self.user_code.clone(),
            "verification_uri" => self.verification_uri.clone(),
            "verification_uri_complete" => self.verification_uri_complete.clone(),
            "interval" => self.interval.map(|v| v.to_string()),
            "expires_in" => self.expires_in.map(|v| v.to_string()),
            _ => None,
        }
    }
}

/// A [`Script`] whose `{placeholder}` occurrences have all been expanded
/// against a [`Context`].
#[derive(Debug, Clone)]
pub struct ResolvedScript {
    pub steps: Script,
}

impl ResolvedScript {
    /// Expand every `{placeholder}` in `script`'s `value`/`note` fields
    /// against `context`. Unknown placeholders are left as literal text
    /// rather than failing.
    pub fn expand(script: &Script, context: &Context) -> Self {
        let steps = script
            .iter()
            .map(|step| ScriptStep {
                step_type: step.step_type,
                value: step.value.as_deref().map(|v| expand_placeholders(v, context)),
                note: step.note.as_deref().map(|v| expand_placeholders(v, context)),
            })
            .collect();
        Self { steps }
    }
}

fn expand_placeholders(input: &str, context: &Context) -> String {
    let mut out = String::with_capacity(input.len());
    let bytes = input.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'{' {
            if let Some(end) = input[i + 1..].find('}') {
                let name = &input[i + 1..i + 1 + end];
                let replacement = context.placeholder(name);
                match replacement {
                    Some(value) => out.push_str(&value),
                    // Unknown placeholder: preserve literally.
                    None => out.push_str(&input[i..=i + 1 + end]),
                }
                i = i + 1 + end + 1;
                continue;
            }
        }
        let ch = input[i..].chars().next().unwrap();
        out.push(ch);
        i += ch.len_utf8();
    }
    out
}
