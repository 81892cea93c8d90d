//! Type tags encoded in resource ids.
//!
//! Resources carry no structural type. A resource "is" of type `image` when
//! its id is `image` or starts with `image` followed by a separator, e.g.
//! `image-hero`, `image:42`, `image/banner`.

use std::fmt::Display;

/// Characters that may follow a type tag in a resource id.
pub const TYPE_SEPARATORS: [char; 4] = ['-', ':', '/', '.'];

/// Build an id of type `tag`: `"{tag}-{name}"`.
pub fn resource_id(tag: &str, name: impl Display) -> String {
    format!("{tag}-{name}")
}

/// Whether `id` belongs to type `tag` under the naming convention.
///
/// An empty tag matches nothing.
pub fn matches_type(id: &str, tag: &str) -> bool {
    if tag.is_empty() {
        return false;
    }
    match id.strip_prefix(tag) {
        Some("") => true,
        Some(rest) => rest.starts_with(TYPE_SEPARATORS),
        None => false,
    }
}

/// The type tag of `id`: everything before the first separator.
///
/// Returns `None` when the id has no separator or starts with one.
pub fn type_tag(id: &str) -> Option<&str> {
    let (tag, _) = id.split_once(TYPE_SEPARATORS)?;
    (!tag.is_empty()).then_some(tag)
}
