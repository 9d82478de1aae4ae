use anyhow::{Context, Result, bail};
use regex::Regex;

/// Replace the inner content of the element whose id is `socials`, leaving
/// every other byte of the document unchanged. The element is a structural
/// precondition on the wiki page template, so a missing element is fatal.
pub fn splice_socials_section(page_html: &str, snippet: &str) -> Result<String> {
    let element = find_element_by_id(page_html, "socials")?
        .ok_or_else(|| anyhow::anyhow!("could not find element with id \"socials\""))?;

    let mut output = String::with_capacity(page_html.len() + snippet.len());
    output.push_str(&page_html[..element.inner_start]);
    output.push_str(snippet);
    output.push_str(&page_html[element.inner_end..]);
    Ok(output)
}

/// Rewrite only the URL argument of `background-image: url(...)` inside the
/// first `.ig-card` block. Quotes, whitespace and every other declaration are
/// preserved; CSS without such a block passes through unchanged.
pub fn update_background_image(css: &str, new_image_url: &str) -> Result<String> {
    let pattern = Regex::new(
        r#"(?s)(\.ig-card\s*\{[^{}]*?background-image\s*:\s*url\(\s*['"]?)([^'")]*)(['"]?\s*\))"#,
    )
    .context("failed to compile .ig-card background-image pattern")?;

    let replaced = pattern.replace(css, |caps: &regex::Captures<'_>| {
        format!("{}{}{}", &caps[1], new_image_url, &caps[3])
    });
    Ok(replaced.into_owned())
}

struct ElementSpan {
    inner_start: usize,
    inner_end: usize,
}

/// Minimal tag scan over the serialized page. Finds the first element whose
/// `id` attribute equals `target_id`, then depth-counts same-name descendant
/// tags to locate the matching close tag.
fn find_element_by_id(html: &str, target_id: &str) -> Result<Option<ElementSpan>> {
    let id_pattern = Regex::new(r#"(?i)\bid\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>/]+))"#)
        .context("failed to compile id attribute pattern")?;

    let bytes = html.as_bytes();
    let mut pos = 0usize;
    while let Some(offset) = html[pos..].find('<') {
        let tag_start = pos + offset;
        if html[tag_start..].starts_with("<!--") {
            pos = match html[tag_start..].find("-->") {
                Some(end) => tag_start + end + 3,
                None => return Ok(None),
            };
            continue;
        }
        let tag_end = match html[tag_start..].find('>') {
            Some(end) => tag_start + end,
            None => return Ok(None),
        };
        let tag_body = &html[tag_start + 1..tag_end];
        if tag_body.starts_with('/') || tag_body.starts_with('!') || tag_body.starts_with('?') {
            pos = tag_end + 1;
            continue;
        }

        let name = tag_name(tag_body);
        if name.is_empty() {
            pos = tag_end + 1;
            continue;
        }

        let id_matches = id_pattern.captures(tag_body).is_some_and(|caps| {
            let value = caps
                .get(1)
                .or_else(|| caps.get(2))
                .or_else(|| caps.get(3))
                .map(|group| group.as_str())
                .unwrap_or("");
            value == target_id
        });
        if !id_matches {
            pos = tag_end + 1;
            continue;
        }

        if bytes.get(tag_end.wrapping_sub(1)) == Some(&b'/') {
            bail!("element with id \"{target_id}\" is self-closing and has no inner content");
        }

        let inner_start = tag_end + 1;
        let inner_end = find_matching_close(html, inner_start, &name)
            .ok_or_else(|| anyhow::anyhow!("no closing </{name}> for element with id \"{target_id}\""))?;
        return Ok(Some(ElementSpan {
            inner_start,
            inner_end,
        }));
    }
    Ok(None)
}

fn tag_name(tag_body: &str) -> String {
    tag_body
        .chars()
        .take_while(|character| character.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase()
}

/// Index of the `<` of the close tag matching an element opened just before
/// `from`, counting nested same-name elements.
fn find_matching_close(html: &str, from: usize, name: &str) -> Option<usize> {
    let mut depth = 1usize;
    let mut pos = from;
    while let Some(offset) = html[pos..].find('<') {
        let tag_start = pos + offset;
        if html[tag_start..].starts_with("<!--") {
            pos = tag_start + html[tag_start..].find("-->")? + 3;
            continue;
        }
        let tag_end = tag_start + html[tag_start..].find('>')?;
        let tag_body = &html[tag_start + 1..tag_end];

        if let Some(close_name) = tag_body.strip_prefix('/') {
            if tag_name(close_name) == name {
                depth -= 1;
                if depth == 0 {
                    return Some(tag_start);
                }
            }
        } else if tag_name(tag_body) == name && !tag_body.ends_with('/') {
            depth += 1;
        }
        pos = tag_end + 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::{splice_socials_section, update_background_image};

    const PAGE: &str = concat!(
        "<h1>Welcome</h1>\n",
        "<div class=\"row\">\n",
        "  <div id=\"socials\" class=\"panel\"><p>stale</p></div>\n",
        "  <div id=\"events\"><p>untouched</p></div>\n",
        "</div>\n",
    );

    #[test]
    fn splice_replaces_only_inner_content() {
        let result = splice_socials_section(PAGE, "<p>fresh</p>").expect("splice");
        let expected = concat!(
            "<h1>Welcome</h1>\n",
            "<div class=\"row\">\n",
            "  <div id=\"socials\" class=\"panel\"><p>fresh</p></div>\n",
            "  <div id=\"events\"><p>untouched</p></div>\n",
            "</div>\n",
        );
        assert_eq!(result, expected);
    }

    #[test]
    fn splice_keeps_sibling_and_ancestor_markup_byte_identical() {
        let result = splice_socials_section(PAGE, "NEW").expect("splice");
        let marker = result.find("NEW").expect("marker");
        let original_prefix = &PAGE[..PAGE.find("<p>stale</p>").expect("stale")];
        let original_suffix = &PAGE[PAGE.find("<p>stale</p>").expect("stale") + "<p>stale</p>".len()..];
        assert_eq!(&result[..marker], original_prefix);
        assert_eq!(&result[marker + 3..], original_suffix);
    }

    #[test]
    fn splice_counts_nested_same_name_elements() {
        let page = "<div id=\"socials\"><div><div>deep</div></div></div><div>after</div>";
        let result = splice_socials_section(page, "X").expect("splice");
        assert_eq!(result, "<div id=\"socials\">X</div><div>after</div>");
    }

    #[test]
    fn splice_accepts_single_quoted_and_unquoted_id() {
        let single = "<section id='socials'>old</section>";
        assert_eq!(
            splice_socials_section(single, "new").expect("splice"),
            "<section id='socials'>new</section>"
        );
        let unquoted = "<div id=socials>old</div>";
        assert_eq!(
            splice_socials_section(unquoted, "new").expect("splice"),
            "<div id=socials>new</div>"
        );
    }

    #[test]
    fn splice_ignores_ids_that_merely_start_with_socials() {
        let page = "<div id=\"socials2\">other</div>";
        let error = splice_socials_section(page, "new").expect_err("must fail");
        assert!(error.to_string().contains("could not find element"));
    }

    #[test]
    fn splice_fails_when_element_is_absent() {
        let error = splice_socials_section("<p>no such element</p>", "new").expect_err("must fail");
        assert!(
            error
                .to_string()
                .contains("could not find element with id \"socials\"")
        );
    }

    #[test]
    fn splice_fails_on_unclosed_element() {
        let error = splice_socials_section("<div id=\"socials\">dangling", "new")
            .expect_err("must fail");
        assert!(error.to_string().contains("no closing </div>"));
    }

    const CSS: &str = concat!(
        ".header { color: #fff; }\n",
        ".ig-card {\n",
        "  border-radius: 8px;\n",
        "  background-image: url('https://cdn.example/old.jpg');\n",
        "  background-size: cover;\n",
        "}\n",
        ".footer { background-image: url('https://cdn.example/footer.png'); }\n",
    );

    #[test]
    fn css_rewrite_changes_only_the_url() {
        let result =
            update_background_image(CSS, "https://cdn.example/new.jpg").expect("rewrite");
        let expected = CSS.replace("https://cdn.example/old.jpg", "https://cdn.example/new.jpg");
        assert_eq!(result, expected);
    }

    #[test]
    fn css_rewrite_leaves_other_blocks_untouched() {
        let result =
            update_background_image(CSS, "https://cdn.example/new.jpg").expect("rewrite");
        assert!(result.contains(".footer { background-image: url('https://cdn.example/footer.png'); }"));
    }

    #[test]
    fn css_without_ig_card_block_passes_through() {
        let css = ".other { background-image: url('x.png'); }";
        let result = update_background_image(css, "https://cdn.example/new.jpg").expect("rewrite");
        assert_eq!(result, css);
    }

    #[test]
    fn css_rewrite_is_idempotent() {
        let once = update_background_image(CSS, "https://cdn.example/new.jpg").expect("rewrite");
        let twice =
            update_background_image(&once, "https://cdn.example/new.jpg").expect("rewrite");
        assert_eq!(once, twice);
    }

    #[test]
    fn css_rewrite_preserves_double_quotes() {
        let css = ".ig-card { background-image: url(\"old.jpg\"); }";
        let result = update_background_image(css, "new.jpg").expect("rewrite");
        assert_eq!(result, ".ig-card { background-image: url(\"new.jpg\"); }");
    }
}
