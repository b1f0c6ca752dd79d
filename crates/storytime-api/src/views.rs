//! Server-rendered HTML pages.

use std::fmt::Write;

use axum::http::StatusCode;

use storytime_db::models::{CategoryRow, StoryRow};

use crate::session::SessionUser;

pub fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

fn layout(title: &str, user: Option<&SessionUser>, body: &str) -> String {
    let nav = match user {
        Some(user) => format!(
            r#"<a href="/dashboard">Dashboard</a> <a href="/stories/create">New story</a> <span class="user">{}</span> <a href="/logout">Log out</a>"#,
            escape(&user.username)
        ),
        None => r#"<a href="/login">Log in</a>"#.to_string(),
    };
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title} | Story Time</title>
</head>
<body>
<header><a class="brand" href="/">Story Time</a> <a href="/stories/random">Random story</a> <nav>{nav}</nav></header>
<main>
{body}
</main>
</body>
</html>
"#,
        title = escape(title),
    )
}

fn category_labels(categories: &[CategoryRow]) -> String {
    categories
        .iter()
        .map(|c| format!(r#"<span class="category">{}</span>"#, escape(&c.label)))
        .collect::<Vec<_>>()
        .join(" ")
}

fn story_card(story: &StoryRow) -> String {
    let image = story
        .image
        .as_ref()
        .map(|file| format!(r#"<img src="{}" alt="">"#, escape(&file.url)))
        .unwrap_or_default();
    format!(
        r#"<article class="story-card">{image}<h2><a href="/stories/{id}">{title}</a></h2><p>{description}</p><p>{categories}</p></article>"#,
        id = story.id,
        title = escape(&story.title),
        description = escape(&story.description),
        categories = category_labels(&story.categories),
    )
}

pub fn index_page(
    user: Option<&SessionUser>,
    stories: &[StoryRow],
    categories: &[CategoryRow],
    selected: Option<&CategoryRow>,
) -> String {
    let mut body = String::from(r#"<aside><h3>Categories</h3><ul><li><a href="/">All</a></li>"#);
    for category in categories {
        let _ = write!(
            body,
            r#"<li><a href="/?category={}">{}</a></li>"#,
            category.id,
            escape(&category.label)
        );
    }
    body.push_str("</ul></aside><section>");

    match selected {
        Some(category) => {
            let _ = write!(body, "<h1>{} stories</h1>", escape(&category.label));
            if let Some(description) = &category.description {
                let _ = write!(body, "<p>{}</p>", escape(description));
            }
        }
        None => body.push_str("<h1>Latest stories</h1>"),
    }

    if stories.is_empty() {
        body.push_str("<p>No stories yet.</p>");
    }
    for story in stories {
        body.push_str(&story_card(story));
    }
    body.push_str("</section>");

    layout("Stories", user, &body)
}

/// Login page with the provider buttons. The browser posts the provider's
/// one-time credential back with the anti-forgery token in `?state=`.
pub fn login_page(
    user: Option<&SessionUser>,
    state_token: &str,
    google_client_id: &str,
    facebook_app_id: &str,
) -> String {
    let state_json = serde_json::to_string(state_token).unwrap_or_default();
    let mut body = String::from("<h1>Log in</h1><div id=\"result\"></div>");

    if !google_client_id.is_empty() {
        let _ = write!(
            body,
            r#"<script src="https://accounts.google.com/gsi/client" async defer></script>
<button id="google-login">Log in with Google</button>
<script>
document.getElementById("google-login").addEventListener("click", function () {{
  google.accounts.oauth2.initCodeClient({{
    client_id: {client_id},
    scope: "openid email profile",
    ux_mode: "popup",
    callback: function (response) {{ sendCredential("/login-google", response.code); }}
  }}).requestCode();
}});
</script>"#,
            client_id = serde_json::to_string(google_client_id).unwrap_or_default(),
        );
    }

    if !facebook_app_id.is_empty() {
        let _ = write!(
            body,
            r#"<script async defer crossorigin="anonymous" src="https://connect.facebook.net/en_US/sdk.js"></script>
<button id="facebook-login">Log in with Facebook</button>
<script>
window.fbAsyncInit = function () {{
  FB.init({{ appId: {app_id}, cookie: true, xfbml: false, version: "v2.8" }});
}};
document.getElementById("facebook-login").addEventListener("click", function () {{
  FB.login(function (response) {{
    if (response.authResponse) {{ sendCredential("/login-facebook", response.authResponse.accessToken); }}
  }}, {{ scope: "public_profile,email" }});
}});
</script>"#,
            app_id = serde_json::to_string(facebook_app_id).unwrap_or_default(),
        );
    }

    if google_client_id.is_empty() && facebook_app_id.is_empty() {
        body.push_str("<p>No login providers are configured.</p>");
    }

    let _ = write!(
        body,
        r#"<script>
function sendCredential(path, credential) {{
  fetch(path + "?state=" + encodeURIComponent({state}), {{
    method: "POST",
    headers: {{ "X-Requested-With": "XMLHttpRequest", "Content-Type": "application/octet-stream; charset=utf-8" }},
    body: credential,
    credentials: "same-origin"
  }}).then(function (r) {{ return r.text().then(function (html) {{
    document.getElementById("result").innerHTML = html;
    if (r.ok) {{ setTimeout(function () {{ window.location.href = "/dashboard"; }}, 2000); }}
  }}); }});
}}
</script>"#,
        state = state_json,
    );

    layout("Log in", user, &body)
}

/// Fragment returned to the login page script after a successful login.
pub fn welcome(user: &SessionUser) -> String {
    let picture = user
        .picture
        .as_ref()
        .map(|url| format!(r#"<img class="avatar" src="{}" alt="">"#, escape(url)))
        .unwrap_or_default();
    format!(
        "<h2>Welcome, {}!</h2>{}<p>Redirecting...</p>",
        escape(&user.username),
        picture
    )
}

pub fn dashboard_page(user: &SessionUser, stories: &[StoryRow], csrf_token: &str) -> String {
    let mut body = format!(
        r#"<h1>{}'s stories</h1><p><a href="/stories/create">Write a new story</a></p>"#,
        escape(&user.username)
    );
    if stories.is_empty() {
        body.push_str("<p>You haven't written any stories yet.</p>");
    } else {
        body.push_str("<table><tr><th>Title</th><th>Status</th><th>Last modified</th><th></th></tr>");
        for story in stories {
            let _ = write!(
                body,
                r#"<tr><td><a href="/stories/{id}">{title}</a></td><td>{status}</td><td>{modified}</td><td><a href="/stories/{id}/edit">Edit</a> {delete}</td></tr>"#,
                id = story.id,
                title = escape(&story.title),
                status = if story.published { "Published" } else { "Draft" },
                modified = escape(&story.date_last_modified),
                delete = delete_form(story.id, csrf_token),
            );
        }
        body.push_str("</table>");
    }
    layout("Dashboard", Some(user), &body)
}

fn delete_form(story_id: i64, csrf_token: &str) -> String {
    format!(
        r#"<form method="post" action="/stories/{}/delete" onsubmit="return confirm('Delete this story?');"><input type="hidden" name="csrf_token" value="{}"><button type="submit">Delete</button></form>"#,
        story_id,
        escape(csrf_token)
    )
}

/// Create form when `story` is `None`, edit form otherwise.
pub fn story_form_page(
    user: &SessionUser,
    story: Option<&StoryRow>,
    categories: &[CategoryRow],
    csrf_token: &str,
) -> String {
    let (heading, action) = match story {
        Some(story) => ("Edit story", format!("/stories/{}/edit", story.id)),
        None => ("New story", "/stories/create".to_string()),
    };
    let field = |f: fn(&StoryRow) -> &str| story.map(|s| escape(f(s))).unwrap_or_default();

    let mut body = format!(
        r#"<h1>{heading}</h1>
<form method="post" action="{action}" enctype="multipart/form-data">
<input type="hidden" name="csrf_token" value="{csrf}">
<label>Title <input name="title" required value="{title}"></label>
<label>Description <input name="description" required value="{description}"></label>
<label>Story <textarea name="story_text" required rows="16">{text}</textarea></label>
<fieldset><legend>Categories</legend>"#,
        csrf = escape(csrf_token),
        title = field(|s| s.title.as_str()),
        description = field(|s| s.description.as_str()),
        text = field(|s| s.story_text.as_str()),
    );

    for category in categories {
        let checked = story
            .map(|s| s.categories.iter().any(|c| c.id == category.id))
            .unwrap_or(false);
        let _ = write!(
            body,
            r#"<label><input type="checkbox" name="categories" value="{}"{}> {}</label>"#,
            category.id,
            if checked { " checked" } else { "" },
            escape(&category.label)
        );
    }
    body.push_str("</fieldset>");

    if let Some(file) = story.and_then(|s| s.image.as_ref()) {
        let _ = write!(
            body,
            r#"<p><img src="{}" alt="" width="200"></p><label><input type="checkbox" name="remove_image" value="1"> Remove image</label>"#,
            escape(&file.url)
        );
    }

    let published = story.map(|s| s.published).unwrap_or(false);
    let _ = write!(
        body,
        r#"<label>Image <input type="file" name="image" accept="image/*"></label>
<label><input type="checkbox" name="published" value="1"{}> Published</label>
<button type="submit">Save</button>
</form>"#,
        if published { " checked" } else { "" }
    );

    layout(heading, Some(user), &body)
}

pub fn story_page(user: Option<&SessionUser>, story: &StoryRow, csrf_token: Option<&str>) -> String {
    let mut body = format!("<article><h1>{}</h1>", escape(&story.title));
    if let Some(file) = &story.image {
        let _ = write!(body, r#"<img src="{}" alt="">"#, escape(&file.url));
    }
    let _ = write!(
        body,
        r#"<p class="description">{}</p><p>{}</p><p class="meta">Written {}</p>"#,
        escape(&story.description),
        category_labels(&story.categories),
        escape(&story.date_created),
    );
    for paragraph in story.story_text.split("\n\n") {
        let _ = write!(body, "<p>{}</p>", escape(paragraph).replace('\n', "<br>"));
    }
    if let Some(token) = csrf_token {
        let _ = write!(
            body,
            r#"<p><a href="/stories/{}/edit">Edit</a></p>{}"#,
            story.id,
            delete_form(story.id, token)
        );
    }
    body.push_str("</article>");
    layout(&story.title, user, &body)
}

pub fn error_page(status: StatusCode, message: &str, user: Option<&SessionUser>) -> String {
    let body = format!(
        r#"<h1>{} {}</h1><p>{}</p><p><a href="/">Back to the stories</a></p>"#,
        status.as_u16(),
        escape(status.canonical_reason().unwrap_or("Error")),
        escape(message)
    );
    layout("Error", user, &body)
}
