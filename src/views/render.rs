//! HTML Rendering
//!
//! Server-side markup of the two views. The dashboard page carries a small
//! script that joins the change-feed and reloads the page on every change,
//! so each open tab re-renders from the mirror of a fresh controller.

use crate::realtime::{ChannelSpec, ClientMessage};
use crate::store::{Bookmark, User};

/// Escape text for element content and quoted attributes
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
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

fn page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
         <title>{}</title>\n</head>\n<body>\n{}\n</body>\n</html>\n",
        escape_html(title),
        body
    )
}

fn notice_line(notice: Option<&str>) -> String {
    match notice {
        Some(text) if !text.is_empty() => {
            format!("<p class=\"notice\" role=\"alert\">{}</p>\n", escape_html(text))
        }
        _ => String::new(),
    }
}

/// Landing view: one sign-in action
pub fn render_landing(notice: Option<&str>, provider: &str) -> String {
    let body = format!(
        "<main>\n<h1>Bookmarks</h1>\n{}\
         <form method=\"post\" action=\"/login\">\n\
         <input type=\"hidden\" name=\"provider\" value=\"{}\">\n\
         <button type=\"submit\">Sign in with {}</button>\n</form>\n</main>",
        notice_line(notice),
        escape_html(provider),
        escape_html(&capitalize(provider))
    );
    page("Bookmarks", &body)
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Everything the dashboard markup shows
pub struct DashboardPage<'a> {
    pub user: &'a User,
    pub bookmarks: &'a [Bookmark],
    pub title: &'a str,
    pub url: &'a str,
    pub notice: Option<&'a str>,
    /// Public key the feed script presents
    pub api_key: &'a str,
    pub channel: ChannelSpec,
}

/// Dashboard view: add form, bookmark list, live reload script
pub fn render_dashboard(page_data: &DashboardPage<'_>) -> String {
    let who = page_data
        .user
        .email
        .as_deref()
        .or(page_data.user.name.as_deref())
        .unwrap_or(&page_data.user.id);

    let mut body = String::new();
    body.push_str("<main>\n<header>\n<h1>My Bookmarks</h1>\n");
    body.push_str(&format!(
        "<p>Signed in as {}</p>\n\
         <form method=\"post\" action=\"/logout\"><button type=\"submit\">Sign out</button></form>\n\
         </header>\n",
        escape_html(who)
    ));
    body.push_str(&notice_line(page_data.notice));

    body.push_str(&format!(
        "<form method=\"post\" action=\"/dashboard/bookmarks\">\n\
         <input name=\"title\" placeholder=\"Title\" value=\"{}\">\n\
         <input name=\"url\" placeholder=\"URL\" value=\"{}\">\n\
         <button type=\"submit\">Add</button>\n</form>\n",
        escape_html(page_data.title),
        escape_html(page_data.url)
    ));

    body.push_str("<ul id=\"bookmarks\">\n");
    for row in page_data.bookmarks {
        body.push_str(&format!(
            "<li data-id=\"{id}\"><a href=\"{url}\" target=\"_blank\" rel=\"noopener noreferrer\">{title}</a>\n\
             <form method=\"post\" action=\"/dashboard/bookmarks/{id}/delete\">\
             <button type=\"submit\">Delete</button></form></li>\n",
            id = escape_html(&row.id),
            url = escape_html(&row.url),
            title = escape_html(&row.title)
        ));
    }
    body.push_str("</ul>\n</main>\n");
    body.push_str(&feed_script(page_data.api_key, &page_data.channel));

    page("My Bookmarks", &body)
}

fn feed_script(api_key: &str, channel: &ChannelSpec) -> String {
    let join = ClientMessage::Join {
        channel: channel.name.clone(),
        changes: channel.changes.clone(),
    };
    let join = serde_json::to_string(&join)
        .unwrap_or_default()
        .replace("</", "<\\/");
    let key = serde_json::to_string(api_key)
        .unwrap_or_default()
        .replace("</", "<\\/");

    format!(
        "<script>\n\
         (function () {{\n\
           var scheme = location.protocol === 'https:' ? 'wss' : 'ws';\n\
           var ws = new WebSocket(scheme + '://' + location.host + \
         '/realtime/v1/websocket?apikey=' + encodeURIComponent({key}));\n\
           ws.onopen = function () {{ ws.send(JSON.stringify({join})); }};\n\
           ws.onmessage = function (event) {{\n\
             var msg = JSON.parse(event.data);\n\
             if (msg.type === 'change') {{ location.reload(); }}\n\
             else if (msg.type === 'channel_error' || msg.type === 'error') {{ console.error(msg.message); }}\n\
           }};\n\
         }})();\n\
         </script>\n",
        key = key,
        join = join
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::views::dashboard::feed_channel;
    use crate::views::testing::{bookmark, user};

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<a href="x">&'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;&amp;&#39;&lt;/a&gt;"
        );
    }

    #[test]
    fn test_landing_has_sign_in_and_notice() {
        let html = render_landing(Some("access_denied"), "google");
        assert!(html.contains("action=\"/login\""));
        assert!(html.contains("Sign in with Google"));
        assert!(html.contains("access_denied"));
        assert!(!render_landing(None, "google").contains("class=\"notice\""));
    }

    #[test]
    fn test_dashboard_lists_rows_escaped() {
        let owner = user("u1");
        let mut row = bookmark("b1", "u1");
        row.title = "<script>alert(1)</script>".to_string();
        let rows = vec![row, bookmark("b2", "u1")];

        let html = render_dashboard(&DashboardPage {
            user: &owner,
            bookmarks: &rows,
            title: "",
            url: "",
            notice: None,
            api_key: "key",
            channel: feed_channel("u1"),
        });

        assert!(html.contains("&lt;script&gt;alert(1)&lt;/script&gt;"));
        assert!(html.contains("/dashboard/bookmarks/b2/delete"));
        assert!(html.contains("bookmarks-realtime"));
        assert!(html.contains("user_id=eq.u1"));
        assert!(html.find("b1").unwrap() < html.find("b2").unwrap());
    }
}
