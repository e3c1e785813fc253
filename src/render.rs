//! Presentation: turn a [`SessionView`] into HTML or terminal output.
//!
//! Every function here is pure. The page is rebuilt from the snapshot on
//! each request; nothing is cached between renders.

use crate::error::SolveError;
use crate::pipeline::llm::Solution;
use crate::session::{ImageView, ResultSlot, SessionView};
use std::fmt::Write as _;

const TITLE: &str = "NeuralMath: AI Interpreter for Handwritten Math";
const TAGLINE: &str = "Upload an image of handwritten math and let NeuralMath solve it for you!";

const STYLE: &str = r#"
body { font-family: system-ui, sans-serif; background: #f3f4f6; margin: 0; }
main { max-width: 48rem; margin: 2rem auto; padding: 2rem; background: #f9fafb; border-radius: .5rem; box-shadow: 0 4px 12px rgba(0,0,0,.1); }
header { text-align: center; }
h1 { font-size: 2.25rem; font-weight: 600; color: #1f2937; }
.panel { padding: 1.5rem; border-radius: .375rem; margin-top: 2rem; }
.upload { display: flex; justify-content: center; gap: .5rem; }
.preview { display: flex; justify-content: center; margin-top: 1.5rem; }
.preview img { max-width: 100%; height: auto; border-radius: .5rem; border: 1px solid #e5e7eb; }
.result { background: #f3f4f6; }
.result pre { background: #111827; color: #fff; padding: 1rem; border-radius: .5rem; white-space: pre-wrap; overflow: auto; }
.error { background: #fef2f2; color: #991b1b; }
.pending { text-align: center; color: #4b5563; }
.stale { color: #92400e; font-size: .875rem; }
.howto { background: #e5e7eb; color: #4b5563; }
footer { text-align: center; color: #6b7280; font-size: .875rem; margin-top: 2rem; }
"#;

/// Escape text for use inside HTML element content or attribute values.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Render the whole page.
///
/// `refresh_secs` is used only while a request is pending, so the answer
/// shows up without the user reloading.
pub fn render_page(view: &SessionView, refresh_secs: u32) -> String {
    let mut html = String::with_capacity(4096);
    html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n");
    html.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n");
    if view.pending && refresh_secs > 0 {
        let _ = writeln!(html, "<meta http-equiv=\"refresh\" content=\"{refresh_secs}\">");
    }
    let _ = writeln!(html, "<title>{}</title>", escape_html(TITLE));
    let _ = writeln!(html, "<style>{STYLE}</style>\n</head>\n<body>\n<main>");

    let _ = writeln!(
        html,
        "<header>\n<h1>{}</h1>\n<p>{}</p>\n</header>",
        escape_html(TITLE),
        escape_html(TAGLINE)
    );

    html.push_str(&render_upload_form());

    if let Some(ref image) = view.image {
        html.push_str(&render_preview(image));
    }
    if view.pending {
        html.push_str(&render_pending(view.in_flight));
    }
    match &view.result {
        ResultSlot::Empty => {}
        ResultSlot::Solved { solution, .. } => html.push_str(&render_result(solution, view.stale)),
        ResultSlot::Failed { error, .. } => html.push_str(&render_error(error, view.stale)),
    }

    html.push_str(&render_how_to());
    html.push_str(&render_footer());
    html.push_str("</main>\n</body>\n</html>\n");
    html
}

/// Choosing a file submits the form; the button only exists without script.
fn render_upload_form() -> String {
    "<form class=\"upload\" action=\"/upload\" method=\"post\" enctype=\"multipart/form-data\">\n\
     <input type=\"file\" name=\"image\" accept=\"image/*\" onchange=\"this.form.submit()\">\n\
     <noscript><button type=\"submit\">Solve</button></noscript>\n\
     </form>\n"
        .to_string()
}

fn render_preview(image: &ImageView) -> String {
    format!(
        "<div class=\"preview\">\n<img src=\"{}\" alt=\"Uploaded: {}\">\n</div>\n",
        escape_html(&image.preview_url),
        escape_html(&image.name)
    )
}

fn render_pending(in_flight: usize) -> String {
    if in_flight > 1 {
        format!("<p class=\"pending\">Solving… ({in_flight} requests in flight)</p>\n")
    } else {
        "<p class=\"pending\">Solving…</p>\n".to_string()
    }
}

fn stale_note(stale: bool) -> &'static str {
    if stale {
        "<p class=\"stale\">This belongs to a previously uploaded image.</p>\n"
    } else {
        ""
    }
}

fn render_result(solution: &Solution, stale: bool) -> String {
    format!(
        "<section class=\"panel result\">\n<h2>Math Expression Result</h2>\n{}<pre>{}</pre>\n</section>\n",
        stale_note(stale),
        escape_html(&solution.text)
    )
}

fn render_error(error: &SolveError, stale: bool) -> String {
    format!(
        "<section class=\"panel error\" role=\"alert\">\n<h2>Could not solve this image</h2>\n{}<p>{}</p>\n<p>Select the file again to retry.</p>\n</section>\n",
        stale_note(stale),
        escape_html(&error.to_string())
    )
}

fn render_how_to() -> String {
    "<section class=\"panel howto\">\n<h2>How to Use</h2>\n<ul>\n\
     <li>Upload an image containing handwritten math equations.</li>\n\
     <li>NeuralMath will automatically process and interpret the math.</li>\n\
     <li>View the result as a solution or interpreted expression below.</li>\n\
     </ul>\n</section>\n"
        .to_string()
}

fn render_footer() -> String {
    "<footer>\n<p>© 2024 NeuralMath, All rights reserved.</p>\n\
     <p>For inquiries, contact us at <a href=\"mailto:support@neuralmath.com\">support@neuralmath.com</a></p>\n\
     </footer>\n"
        .to_string()
}

// ── Terminal ─────────────────────────────────────────────────────────────

/// Text printed by `neuralmath solve`: the answer verbatim, newline-terminated.
pub fn render_cli(solution: &Solution) -> String {
    let mut out = solution.text.clone();
    if !out.ends_with('\n') {
        out.push('\n');
    }
    out
}
