//! Pull form fields, the nonce, and message regions out of portal pages.
//!
//! Every portal response is an HTML document. The session needs three things
//! from it:
//!
//! 1. **Form fields**: named `<input>` values per `<form>`, used to rebuild
//!    hidden submission fields (semester tokens, login tokens, the obligations
//!    form).
//! 2. **The nonce**: the `s_nonce` input echoed on every page.
//! 3. **Message regions**: `span.notification` and `span.error` text, plus
//!    the registration-access error form.
//!
//! All entry points are synchronous and return owned data. `scraper::Html` is
//! not `Send`, so documents never live across an `.await`.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use scraper::{ElementRef, Html, Selector};

use crate::protocol::{ACCESS_ERROR_ACTION, FIELD_NONCE};

/// Named input values of one form, keyed by input name.
pub type FormFields = BTreeMap<String, String>;

/// One `<form>` element and the inputs it carries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HtmlForm {
    /// Raw `action` attribute.
    pub action: Option<String>,
    /// Raw `method` attribute, as written in the page.
    pub method: Option<String>,
    /// Inputs with both a non-empty name and a non-empty value.
    pub fields: FormFields,
}

impl HtmlForm {
    /// Whether any input in this form carries exactly `value`.
    pub fn has_value(&self, value: &str) -> bool {
        self.fields.values().any(|v| v == value)
    }
}

/// Notification and error text found on a portal page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortalMessages {
    pub notifications: Vec<String>,
    pub errors: Vec<String>,
}

impl PortalMessages {
    /// The portal signals rejection only through error regions.
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

struct Selectors {
    form: Selector,
    input: Selector,
    nonce: Selector,
    notification: Selector,
    error: Selector,
    access_error: Selector,
}

fn selectors() -> &'static Selectors {
    static SELECTORS: OnceLock<Selectors> = OnceLock::new();
    SELECTORS.get_or_init(|| Selectors {
        form: Selector::parse("form").expect("form selector is valid"),
        input: Selector::parse("input").expect("input selector is valid"),
        nonce: Selector::parse(&format!("input[name=\"{FIELD_NONCE}\"]"))
            .expect("nonce selector is valid"),
        notification: Selector::parse("span.notification")
            .expect("notification selector is valid"),
        error: Selector::parse("span.error").expect("error selector is valid"),
        access_error: Selector::parse(&format!("form[action$=\"{ACCESS_ERROR_ACTION}\"]"))
            .expect("access error selector is valid"),
    })
}

/// Parse every `<form>` in the document, in document order.
pub fn extract_forms(html: &str) -> Vec<HtmlForm> {
    let document = Html::parse_document(html);
    let sel = selectors();

    document
        .select(&sel.form)
        .map(|form| HtmlForm {
            action: form.value().attr("action").map(String::from),
            method: form.value().attr("method").map(String::from),
            fields: form_fields(&form, &sel.input),
        })
        .collect()
}

/// Current nonce value, if the page echoes one.
pub fn extract_nonce(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    document
        .select(&selectors().nonce)
        .next()
        .and_then(|input| input.value().attr("value"))
        .map(String::from)
}

/// Collect notification and error text from the page.
///
/// Empty error regions still count as errors; their presence alone is the
/// portal's rejection marker.
pub fn extract_messages(html: &str) -> PortalMessages {
    let document = Html::parse_document(html);
    let sel = selectors();

    let notifications = document
        .select(&sel.notification)
        .map(|el| element_text(&el))
        .collect();

    let errors = document
        .select(&sel.error)
        .chain(document.select(&sel.access_error))
        .map(|el| element_text(&el))
        .collect();

    PortalMessages {
        notifications,
        errors,
    }
}

/// First form whose field `key` contains `needle`, compared case-insensitively.
pub fn find_form_by_field<'a>(forms: &'a [HtmlForm], key: &str, needle: &str) -> Option<&'a HtmlForm> {
    let needle = needle.to_lowercase();
    forms.iter().find(|form| {
        form.fields
            .get(key)
            .is_some_and(|value| value.to_lowercase().contains(&needle))
    })
}

fn form_fields(form: &ElementRef<'_>, input_sel: &Selector) -> FormFields {
    let mut fields = FormFields::new();
    for input in form.select(input_sel) {
        let name = input.value().attr("name").unwrap_or("");
        let value = input.value().attr("value").unwrap_or("");
        if name.is_empty() || value.is_empty() {
            continue;
        }
        fields.insert(name.to_string(), value.to_string());
    }
    fields
}

fn element_text(el: &ElementRef<'_>) -> String {
    el.text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEMESTER_PAGE: &str = r#"
        <html><body>
        <form action="registration.WBX" method="post">
            <input type="hidden" name="s_ccyys" value="20249">
            <input type="hidden" name="s_nonce" value="abc123">
            <input type="submit" name="submit" value="Fall 2024 Registration">
        </form>
        <form action="registration.WBX" method="post">
            <input type="hidden" name="s_ccyys" value="20252">
            <input type="submit" name="submit" value="SPRING 2025 Registration">
            <input type="text" name="blank" value="">
            <input type="text" value="orphan">
        </form>
        </body></html>
    "#;

    #[test]
    fn test_extract_forms() {
        let forms = extract_forms(SEMESTER_PAGE);
        assert_eq!(forms.len(), 2);
        assert_eq!(forms[0].method.as_deref(), Some("post"));
        assert_eq!(forms[0].fields.get("s_ccyys").map(String::as_str), Some("20249"));
        assert_eq!(forms[1].fields.len(), 2);
        assert!(!forms[1].fields.contains_key("blank"));
    }

    #[test]
    fn test_find_form_case_insensitive() {
        let forms = extract_forms(SEMESTER_PAGE);
        let spring = find_form_by_field(&forms, "submit", "Spring").unwrap();
        assert_eq!(spring.fields["s_ccyys"], "20252");
        assert!(find_form_by_field(&forms, "submit", "summer").is_none());
        assert!(find_form_by_field(&forms, "missing", "fall").is_none());
    }

    #[test]
    fn test_extract_nonce() {
        assert_eq!(extract_nonce(SEMESTER_PAGE).as_deref(), Some("abc123"));
        assert_eq!(extract_nonce("<html><body><p>none</p></body></html>"), None);
        assert_eq!(extract_nonce(r#"<input name="s_nonce">"#), None);
    }

    #[test]
    fn test_extract_messages() {
        let html = r#"
            <html><body>
            <span class="notification">  Registration
                 open  </span>
            <span class="error">Section 11111 is closed.</span>
            <span class="error"></span>
            </body></html>
        "#;
        let messages = extract_messages(html);
        assert_eq!(messages.notifications, vec!["Registration open"]);
        assert_eq!(messages.errors.len(), 2);
        assert_eq!(messages.errors[0], "Section 11111 is closed.");
        assert!(!messages.is_clean());
    }

    #[test]
    fn test_access_error_form_counts_as_error() {
        let html = r#"
            <form action="/registration/registrationAccessError.WBX">
                <p>You do not have access to registration at this time.</p>
            </form>
        "#;
        let messages = extract_messages(html);
        assert_eq!(
            messages.errors,
            vec!["You do not have access to registration at this time."]
        );
    }

    #[test]
    fn test_clean_page() {
        let messages = extract_messages(r#"<span class="notification">Added 22222</span>"#);
        assert!(messages.is_clean());
        assert_eq!(messages.notifications.len(), 1);
    }

    #[test]
    fn test_has_value() {
        let forms = extract_forms(
            r#"<form><input name="s_request" value="STUOF"><input name="x" value="1"></form>"#,
        );
        assert!(forms[0].has_value("STUOF"));
        assert!(!forms[0].has_value("STADD"));
    }
}
