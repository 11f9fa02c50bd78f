//! Text insertion patches
//!
//! Patches are recorded against byte offsets of the original source and
//! applied from the highest offset to the lowest, so an insertion never
//! moves the offset of a patch that has not been applied yet.

/// Insert `text` before byte `offset` of the original source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Patch {
    pub offset: usize,
    pub text: String,
}

impl Patch {
    pub fn insert(offset: usize, text: impl Into<String>) -> Self {
        Self {
            offset,
            text: text.into(),
        }
    }
}

/// Apply all patches to `source`
///
/// Offsets must fall on char boundaries and within the source. Patches
/// sharing an offset are inserted in the order they were recorded.
pub fn apply_patches(source: &str, mut patches: Vec<Patch>) -> String {
    if patches.is_empty() {
        return source.to_string();
    }

    let extra: usize = patches.iter().map(|p| p.text.len()).sum();
    let mut out = String::with_capacity(source.len() + extra);
    out.push_str(source);

    // Stable sort keeps recording order for equal offsets; reversing it
    // and inserting back-to-front then restores that order in the output.
    patches.sort_by_key(|p| p.offset);
    for patch in patches.iter().rev() {
        debug_assert!(patch.offset <= source.len());
        debug_assert!(source.is_char_boundary(patch.offset));
        out.insert_str(patch.offset, &patch.text);
    }

    out
}
