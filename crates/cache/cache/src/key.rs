/// Render a caller-supplied key into its wire form for networked backends.
///
/// Both `/` and `\` become `_` and the result is upper-cased. The transform
/// is one-way; keys are opaque to the cache so nothing ever needs to map a
/// wire key back.
pub fn format_key(key: &str) -> String {
    key.chars()
        .map(|c| match c {
            '/' | '\\' => '_',
            other => other,
        })
        .flat_map(char::to_uppercase)
        .collect()
}

/// Render a key into its wire form and prepend the store prefix verbatim.
///
/// The format is `{prefix}{FORMATTED_KEY}`. An empty prefix yields the same
/// result as [`format_key`].
pub fn format_key_with_prefix(prefix: &str, key: &str) -> String {
    let mut rendered = String::with_capacity(prefix.len() + key.len());
    rendered.push_str(prefix);
    rendered.push_str(&format_key(key));
    rendered
}
