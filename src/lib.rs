//! Debug toolbar for axum applications
//!
//! Attach a [`Toolbar`] to a router and every request from an allowed client
//! is recorded with its panels (headers, request variables, log records,
//! traceback). Unhandled failures, whether a [`HandlerError`] or a panic,
//! become a traceback page whose frames can be inspected in a small console.
//!
//! ```no_run
//! use axum::{routing::get, Router};
//! use debug_toolbar::{config::Config, FrameLayer, RequestLogLayer, Toolbar};
//! use tracing_subscriber::layer::SubscriberExt;
//! use tracing_subscriber::util::SubscriberInitExt;
//!
//! # async fn run() -> anyhow::Result<()> {
//! tracing_subscriber::registry()
//!     .with(FrameLayer::default())
//!     .with(RequestLogLayer::new())
//!     .init();
//!
//! let toolbar = Toolbar::new(Config::default());
//! let app = toolbar.attach(Router::new().route("/", get(|| async { "hi" })));
//!
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:5000").await?;
//! axum::serve(
//!     listener,
//!     app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
//! )
//! .await?;
//! # Ok(())
//! # }
//! ```

pub mod capture;
pub mod config;
pub mod error;
pub mod events;
pub mod history;
pub mod ids;
pub mod intercept;
pub mod logging;
pub mod panels;
pub mod render;
pub mod state;
pub mod toolbar;
pub mod util;

pub use capture::{CapturedFrame, CapturedTraceback, FrameLayer, FrameRegistry, TracebackCapture};
pub use error::{HandlerError, ToolbarError, Unauthorized};
pub use events::{EventBatch, RequestRecord};
pub use history::BoundedHistory;
pub use ids::{FrameId, RequestId, TracebackId};
pub use intercept::{HandlerHooks, Intercepted};
pub use logging::RequestLogLayer;
pub use panels::{AppInfo, PackageInfo, Panel, PanelRegistry, RouteInfo};
pub use render::{HtmlRenderer, RenderError, Renderer};
pub use state::{Phase, RequestState};
pub use toolbar::{middleware, Toolbar, ToolbarBuilder};
