//! Single-page entry extraction.

use scraper::{ElementRef, Html, Selector};
use tracing::trace;

use docsetgen_shared::{Candidate, DocsetError, EntryKind, Result, UnitShape};

use crate::rules::{RuleSet, UnitContext};

/// Extract candidates from one parsed page, in document order.
///
/// `rel_path` is the page's path relative to the tree root, with `/`
/// separators; it becomes the file component of every candidate's path.
pub fn extract_page(
    rel_path: &str,
    html: &str,
    rules: &RuleSet,
    max_markup_errors: Option<usize>,
) -> Result<Vec<Candidate>> {
    let doc = Html::parse_document(html);

    if let Some(limit) = max_markup_errors {
        if doc.errors.len() > limit {
            return Err(DocsetError::parse(
                rel_path,
                format!(
                    "{} markup errors (limit {limit}), first: {}",
                    doc.errors.len(),
                    doc.errors.first().map(|e| e.to_string()).unwrap_or_default()
                ),
            ));
        }
    }

    let page_stem = page_stem(rel_path);
    let id_sel = Selector::parse("[id]").expect("valid selector");
    let mut candidates = Vec::new();

    for el in doc.select(&id_sel) {
        let Some(id) = el.value().attr("id").filter(|id| !id.is_empty()) else {
            continue;
        };
        let Some((unit, shape)) = unit_of(el) else {
            continue;
        };

        let visible: String = unit.text().collect();
        if visible.is_empty() {
            trace!(path = rel_path, id, "anchor without text, skipping");
            continue;
        }

        let ctx = UnitContext {
            unit,
            shape,
            id,
            page_stem,
        };
        let (kind, name) = match rules.classify(&ctx) {
            Some(rule) => {
                let label = rule
                    .label
                    .as_ref()
                    .and_then(|sel| unit.select(sel).next())
                    .map(|el| el.text().collect::<String>())
                    .filter(|text| !text.trim().is_empty());
                (rule.kind, label.unwrap_or(visible))
            }
            None => (EntryKind::Section, visible),
        };

        candidates.push(Candidate {
            name,
            kind,
            path: format!("{rel_path}#{id}"),
        });
    }

    Ok(candidates)
}

/// Find the documentation unit an identifier belongs to: the element itself
/// when it is a term or heading, else its nearest such ancestor.
fn unit_of(el: ElementRef<'_>) -> Option<(ElementRef<'_>, UnitShape)> {
    if let Some(shape) = shape_of(el.value().name()) {
        return Some((el, shape));
    }
    el.ancestors()
        .filter_map(ElementRef::wrap)
        .find_map(|a| shape_of(a.value().name()).map(|shape| (a, shape)))
}

fn shape_of(tag: &str) -> Option<UnitShape> {
    match tag {
        "dt" => Some(UnitShape::Term),
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => Some(UnitShape::Heading),
        _ => None,
    }
}

/// File stem of the last path segment (`guide/options.html` → `options`).
fn page_stem(rel_path: &str) -> &str {
    let file = rel_path.rsplit('/').next().unwrap_or(rel_path);
    file.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(file)
}
