use axum::{extract::Request, http::StatusCode, middleware::Next, response::Response};
use chrono::Local;
use std::time::Instant;

// ANSI color codes, disabled when stderr is not a terminal
struct Colors {
    reset: &'static str,
    green: &'static str,
    yellow: &'static str,
    red: &'static str,
    cyan: &'static str,
    blue: &'static str,
    magenta: &'static str,
}

impl Colors {
    fn new() -> Self {
        if atty::is(atty::Stream::Stderr) {
            Self {
                reset: "\x1b[0m",
                green: "\x1b[92m",
                yellow: "\x1b[93m",
                red: "\x1b[91m",
                cyan: "\x1b[96m",
                blue: "\x1b[94m",
                magenta: "\x1b[95m",
            }
        } else {
            Self {
                reset: "",
                green: "",
                yellow: "",
                red: "",
                cyan: "",
                blue: "",
                magenta: "",
            }
        }
    }

    fn status_color(&self, status: StatusCode) -> &'static str {
        let code = status.as_u16();
        if (200..300).contains(&code) {
            self.green
        } else if (300..400).contains(&code) {
            self.yellow
        } else {
            self.red
        }
    }
}

/// Request/response logging for the HTTP server, active at `-v` and above.
#[derive(Clone)]
pub struct LoggingMiddleware {
    pub verbose: u8,
}

impl LoggingMiddleware {
    #[must_use]
    pub fn new(verbose: u8) -> Self {
        Self { verbose }
    }

    pub async fn handle(&self, request: Request, next: Next) -> Response {
        if self.verbose == 0 {
            return next.run(request).await;
        }

        let colors = Colors::new();
        let method = request.method().clone();
        let uri = request.uri().clone();
        let start = Instant::now();

        let response = next.run(request).await;

        let status = response.status();
        let elapsed_ms = start.elapsed().as_millis();
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
        eprintln!(
            "{timestamp} - INFO - {}{method}{} {}{uri}{} -> {}{status}{} {}({elapsed_ms}ms){}",
            colors.cyan,
            colors.reset,
            colors.blue,
            colors.reset,
            colors.status_color(status),
            colors.reset,
            colors.magenta,
            colors.reset,
        );

        response
    }
}
