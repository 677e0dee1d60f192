use crate::tab::Tab;
use anyhow::{Context, Result, anyhow};
use serde_json::{Value, json};

/// Picks an option and fires the events a real user interaction would, so
/// framework listeners bound to the control see the change.
const SELECT_OPTION_FN: &str = r#"
function(value) {
    if (this.tagName !== 'SELECT') {
        return { status: 'not-a-select', tag: this.tagName };
    }
    const option = Array.from(this.options).find((o) => o.value === value);
    if (!option) {
        return { status: 'no-such-option', options: Array.from(this.options).map((o) => o.value) };
    }
    this.value = option.value;
    this.dispatchEvent(new Event('input', { bubbles: true }));
    this.dispatchEvent(new Event('change', { bubbles: true }));
    return { status: 'selected', value: this.value };
}
"#;

/// Represents a DOM element controlled via CDP.
pub struct Element<'a> {
    parent: &'a Tab,
    object_id: String,
}

impl<'a> Element<'a> {
    pub(crate) async fn new(parent: &'a Tab, node_id: u64) -> Result<Self> {
        let res = parent
            .send_cmd("DOM.resolveNode", json!({ "nodeId": node_id }))
            .await?;
        let object_id = res["result"]["object"]["objectId"]
            .as_str()
            .context("No objectId for resolved node")?
            .to_string();

        Ok(Self { parent, object_id })
    }

    /// Selects the option with the given `value` attribute.
    ///
    /// The value must name an existing option; nothing is changed on the
    /// control otherwise.
    pub async fn select_value(&self, value: &str) -> Result<()> {
        let res = self
            .parent
            .send_cmd(
                "Runtime.callFunctionOn",
                json!({
                    "objectId": self.object_id,
                    "functionDeclaration": SELECT_OPTION_FN.trim(),
                    "arguments": [{ "value": value }],
                    "returnByValue": true,
                }),
            )
            .await?;

        check_select_outcome(&res["result"]["result"]["value"], value)
    }

    /// The control's current value.
    pub async fn value(&self) -> Result<String> {
        let res = self
            .parent
            .send_cmd(
                "Runtime.callFunctionOn",
                json!({
                    "objectId": self.object_id,
                    "functionDeclaration": "function() { return this.value; }",
                    "returnByValue": true,
                }),
            )
            .await?;

        res["result"]["result"]["value"]
            .as_str()
            .map(|s| s.to_string())
            .context("Control value is not a string")
    }
}

fn check_select_outcome(outcome: &Value, value: &str) -> Result<()> {
    match outcome["status"].as_str() {
        Some("selected") => Ok(()),
        Some("no-such-option") => Err(anyhow!(
            "Control has no option with value {value:?} (available: {})",
            outcome["options"]
        )),
        Some("not-a-select") => Err(anyhow!(
            "Matched element is a <{}>, not a <select>",
            outcome["tag"].as_str().unwrap_or("?").to_lowercase()
        )),
        _ => Err(anyhow!("Select returned no status (reply: {outcome})")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selected_status_is_ok() {
        let outcome = json!({ "status": "selected", "value": "dog" });
        assert!(check_select_outcome(&outcome, "dog").is_ok());
    }

    #[test]
    fn missing_options_list_the_alternatives() {
        let outcome = json!({ "status": "no-such-option", "options": ["cat", "dog"] });
        let err = check_select_outcome(&outcome, "zebra").unwrap_err().to_string();
        assert!(err.contains("zebra"));
        assert!(err.contains("dog"));
    }

    #[test]
    fn non_select_elements_are_rejected() {
        let outcome = json!({ "status": "not-a-select", "tag": "INPUT" });
        let err = check_select_outcome(&outcome, "dog").unwrap_err().to_string();
        assert!(err.contains("<input>"));
    }

    #[test]
    fn a_missing_status_is_an_error() {
        assert!(check_select_outcome(&Value::Null, "dog").is_err());
    }
}
