use super::escape;
use crate::export::Meta;

/// Landing page linking every page written in the run.
pub fn index_page(meta: &Meta, pages: &[(String, String)]) -> String {
    let mut items = String::new();
    for (href, title) in pages {
        items.push_str(&format!(
            "  <li><a href=\"{}\">{}</a></li>\n",
            escape(href),
            escape(title)
        ));
    }
    format!(
        r#"<!doctype html>
<html lang="en">
<head>
<meta charset="utf-8"/>
<meta name="viewport" content="width=device-width, initial-scale=1"/>
<title>AACT Dashboard</title>
</head>
<body style="font-family:system-ui,Segoe UI,Arial,sans-serif;padding:24px;">
<h1>AACT Dashboard</h1>
<p>Data as of {as_of}</p>
<ul>
{items}</ul>
</body>
</html>
"#,
        as_of = escape(&meta.as_of_utc),
        items = items
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn links_every_page_in_order() {
        let meta = Meta { as_of_utc: "2024-01-15T00:00:00Z".into() };
        let pages = vec![
            ("b.html".to_string(), "Phase × Status".to_string()),
            ("a.html".to_string(), "Trials & Phases".to_string()),
        ];
        let html = index_page(&meta, &pages);
        let b = html.find("b.html").unwrap();
        let a = html.find("a.html").unwrap();
        assert!(b < a);
        assert!(html.contains("Trials &amp; Phases"));
        assert!(html.contains("2024-01-15T00:00:00Z"));
    }
}
