use axum::response::Html;

const PAGE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head><meta charset="utf-8"><title>sandbox lease manager</title></head>
<body>
<h1>sandbox lease manager</h1>
<p>POST /deploy to start a sandbox, POST /extend or /stop to manage it.</p>
</body>
</html>"#;

pub async fn index() -> Html<&'static str> {
    Html(PAGE)
}
