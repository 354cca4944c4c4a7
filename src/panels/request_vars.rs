use axum::http::header::COOKIE;
use serde_json::{json, Value};

use super::{Panel, PanelContext};

/// Query parameters, form fields and cookies of the request
#[derive(Debug, Default)]
pub struct RequestVarsPanel {
    url: String,
    get: Vec<(String, Vec<String>)>,
    post: Vec<(String, Vec<String>)>,
    cookies: Vec<(String, String)>,
}

impl RequestVarsPanel {
    pub fn new(ctx: &PanelContext<'_>) -> Self {
        let query = ctx.parts.uri.query().unwrap_or("");
        let get = group(url::form_urlencoded::parse(query.as_bytes()).into_owned());
        let post = group(ctx.form.iter().cloned());

        let cookies = ctx
            .parts
            .headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|header| header.split(';'))
            .filter_map(|pair| {
                let (name, value) = pair.trim().split_once('=')?;
                Some((name.trim().to_string(), value.trim().to_string()))
            })
            .collect();

        Self {
            url: ctx.parts.uri.to_string(),
            get,
            post,
            cookies,
        }
    }
}

/// Collect repeated keys into one entry, in order of first appearance
fn group(pairs: impl Iterator<Item = (String, String)>) -> Vec<(String, Vec<String>)> {
    let mut grouped: Vec<(String, Vec<String>)> = Vec::new();
    for (key, value) in pairs {
        match grouped.iter_mut().find(|(k, _)| *k == key) {
            Some((_, values)) => values.push(value),
            None => grouped.push((key, vec![value])),
        }
    }
    grouped
}

impl Panel for RequestVarsPanel {
    fn name(&self) -> &'static str {
        "Request Vars"
    }

    fn title(&self) -> String {
        "Request Vars".to_string()
    }

    fn template(&self) -> &'static str {
        "panels/request_vars"
    }

    fn render_vars(&self) -> Value {
        json!({
            "url": self.url,
            "get": self.get,
            "post": self.post,
            "cookies": self.cookies,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::panels::test_support::{context, parts};

    #[test]
    fn test_query_is_decoded_and_grouped() {
        let parts = parts("/search?q=rust%20lang&tag=a&tag=b", &[]);
        let panel = RequestVarsPanel::new(&context(&parts, &[]));

        let vars = panel.render_vars();
        assert_eq!(vars["get"], json!([["q", ["rust lang"]], ["tag", ["a", "b"]]]));
        assert_eq!(vars["url"], "/search?q=rust%20lang&tag=a&tag=b");
    }

    #[test]
    fn test_form_and_cookies() {
        let parts = parts("/", &[("cookie", "session=abc; theme=dark")]);
        let form = vec![("name".to_string(), "bob".to_string())];
        let panel = RequestVarsPanel::new(&context(&parts, &form));

        let vars = panel.render_vars();
        assert_eq!(vars["post"], json!([["name", ["bob"]]]));
        assert_eq!(vars["cookies"], json!([["session", "abc"], ["theme", "dark"]]));
    }

    #[test]
    fn test_dom_id_strips_spaces() {
        let parts = parts("/", &[]);
        let panel = RequestVarsPanel::new(&context(&parts, &[]));
        assert_eq!(panel.dom_id(), "pDebugRequestVarsPanel");
    }
}
