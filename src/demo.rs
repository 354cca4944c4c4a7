// Demo application - a tiny app that exercises every toolbar feature
//
// /           HTML page (the toolbar marker is injected before </body>)
// /redirect   302 to / (shown as an interstitial page)
// /exception  division by zero deep inside instrumented functions
// /panic      out-of-bounds index after the handler has yielded once
// /logs       emits log records collected by the logging panel
// /form       GET shows a form, POST echoes it (request vars panel)

use axum::{
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Form, Router,
};
use debug_toolbar::{AppInfo, HandlerError, PackageInfo, RouteInfo};

/// Error raised by the demo's arithmetic
#[derive(Debug, thiserror::Error)]
#[error("division by zero")]
pub struct ZeroDivisionError;

pub fn router() -> Router {
    Router::new()
        .route("/", get(index))
        .route("/redirect", get(redirect))
        .route("/exception", get(exception))
        .route("/panic", get(panic_page))
        .route("/logs", get(logs))
        .route("/form", get(form_page).post(form_submit))
}

/// What the global panels show about the demo
pub fn app_info() -> AppInfo {
    AppInfo {
        routes: vec![
            RouteInfo::new("index", "GET", "/", "demo::index"),
            RouteInfo::new("redirect", "GET", "/redirect", "demo::redirect"),
            RouteInfo::new("exception", "GET", "/exception", "demo::exception"),
            RouteInfo::new("panic", "GET", "/panic", "demo::panic_page"),
            RouteInfo::new("logs", "GET", "/logs", "demo::logs"),
            RouteInfo::new("form", "GET", "/form", "demo::form_page"),
            RouteInfo::new("form_submit", "POST", "/form", "demo::form_submit"),
        ],
        middlewares: vec!["debug_toolbar::middleware".to_string()],
        packages: vec![
            PackageInfo::new("axum", "0.7"),
            PackageInfo::new("tokio", "1"),
            PackageInfo::new("tracing", "0.1"),
            PackageInfo::new("serde_json", "1"),
        ],
    }
}

fn page(title: &str, body: &str) -> Html<String> {
    Html(format!(
        "<!DOCTYPE html>\n<html><head><title>{title}</title></head>\n<body>\n<h1>{title}</h1>\n{body}\n</body></html>\n"
    ))
}

async fn index() -> Html<String> {
    page(
        "Debug toolbar demo",
        r#"<ul>
<li><a href="/redirect">Redirect</a></li>
<li><a href="/exception">Exception</a></li>
<li><a href="/panic">Panic</a></li>
<li><a href="/logs">Logs</a></li>
<li><a href="/form">Form</a></li>
</ul>"#,
    )
}

async fn redirect() -> Response {
    (StatusCode::FOUND, [(header::LOCATION, "/")]).into_response()
}

#[tracing::instrument]
async fn exception() -> Result<Html<String>, HandlerError> {
    let scores = vec![7, 9, 4];
    let visits = 0;
    let ratio = average_per_visit(&scores, visits)?;
    Ok(page("Unreachable", &ratio.to_string()))
}

#[tracing::instrument]
fn average_per_visit(scores: &[i64], visits: i64) -> Result<i64, HandlerError> {
    let total: i64 = scores.iter().sum();
    tracing::debug!(total, "Summed scores");
    Ok(divide(total, visits)?)
}

fn divide(numerator: i64, denominator: i64) -> Result<i64, ZeroDivisionError> {
    numerator.checked_div(denominator).ok_or(ZeroDivisionError)
}

#[tracing::instrument]
async fn panic_page() -> Html<String> {
    tokio::task::yield_now().await;
    let queue: Vec<u32> = vec![1, 2, 3];
    let picked = pick(&queue, queue.len() + 2);
    page("Unreachable", &picked.to_string())
}

#[tracing::instrument]
fn pick(queue: &[u32], index: usize) -> u32 {
    queue[index]
}

#[tracing::instrument]
async fn logs() -> Html<String> {
    tracing::debug!("Preparing log demo");
    tracing::info!(user = "ada", "User opened the log page");
    tracing::warn!(remaining = 3, "Quota almost exhausted");
    tracing::error!("Something went wrong (not really)");
    page(
        "Logs",
        "<p>Four log records were emitted. Open the toolbar's Logging panel.</p>",
    )
}

async fn form_page() -> Html<String> {
    page(
        "Form",
        r#"<form method="post" action="/form">
<input name="name" value="Ada">
<input name="tags" value="math">
<input name="tags" value="engines">
<button type="submit">Send</button>
</form>"#,
    )
}

async fn form_submit(Form(fields): Form<Vec<(String, String)>>) -> Html<String> {
    let items: String = fields
        .iter()
        .map(|(k, v)| {
            format!(
                "<li>{} = {}</li>",
                debug_toolbar::util::escape_html(k),
                debug_toolbar::util::escape_html(v)
            )
        })
        .collect();
    page("Submitted", &format!("<ul>{items}</ul>"))
}
