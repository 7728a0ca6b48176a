use crate::models::ProcessedArticle;

/// Escape text for use in element content and double- or single-quoted attributes.
pub fn escape_html(raw: &str) -> String {
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

/// Link-preview page whose Open Graph tags mirror the article's metadata.
pub fn render_preview(article: &ProcessedArticle) -> String {
    let meta = |key: &str| {
        article
            .og_metadata
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    };

    let url = escape_html(meta("url").unwrap_or(&article.url));
    let title = escape_html(meta("title").unwrap_or(&article.url));
    let description = escape_html(meta("description").unwrap_or(""));
    let site_name = escape_html(meta("site_name").unwrap_or(""));
    let image = meta("image").map(escape_html);

    let mut tags = vec![
        format!(r#"<meta property="og:title" content="{title}">"#),
        format!(r#"<meta property="og:description" content="{description}">"#),
        format!(r#"<meta property="og:url" content="{url}">"#),
        format!(r#"<meta property="og:site_name" content="{site_name}">"#),
        r#"<meta property="og:type" content="article">"#.to_string(),
    ];
    if let Some(image) = &image {
        tags.push(format!(r#"<meta property="og:image" content="{image}">"#));
    }

    let summary: String = article
        .summary
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| format!("<p>{}</p>", escape_html(p)))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title}</title>
<meta name="description" content="{description}">
{tags}
</head>
<body>
<article>
<h1>{title}</h1>
<p><a href="{url}">{site}</a></p>
{summary}
</article>
</body>
</html>
"#,
        tags = tags.join("\n"),
        site = if site_name.is_empty() { &url } else { &site_name },
    )
}
