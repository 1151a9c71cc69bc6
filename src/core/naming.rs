//! Identifier case conversion and root field naming
//!
//! Schema names are GraphQL-style (`UserClub`, `createdAt`); SQL identifiers
//! are their snake_case form (`user_club`, `created_at`).

/// Convert a PascalCase or camelCase name to snake_case
///
/// Runs of capitals are kept together, so `userID` becomes `user_id` and
/// `HTTPRequest` becomes `http_request`. Names that are already snake_case
/// are returned unchanged.
///
/// ```
/// use graphsql::core::naming::to_snake_case;
///
/// assert_eq!(to_snake_case("createdAt"), "created_at");
/// assert_eq!(to_snake_case("UserClub"), "user_club");
/// assert_eq!(to_snake_case("class_id"), "class_id");
/// ```
pub fn to_snake_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut result = String::with_capacity(name.len() + 4);

    for (i, &ch) in chars.iter().enumerate() {
        if ch.is_uppercase() {
            let prev = i.checked_sub(1).map(|p| chars[p]);
            let next = chars.get(i + 1).copied();
            let boundary = match prev {
                None | Some('_') => false,
                Some(p) if p.is_lowercase() || p.is_ascii_digit() => true,
                Some(p) if p.is_uppercase() => next.is_some_and(|n| n.is_lowercase()),
                _ => false,
            };
            if boundary {
                result.push('_');
            }
            result.extend(ch.to_lowercase());
        } else {
            result.push(ch);
        }
    }

    result
}

/// Lower the first character (`UserClub` -> `userClub`)
pub fn to_lower_camel(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Plural form of an English noun, used for default list root fields
///
/// ```
/// use graphsql::core::naming::pluralize;
///
/// assert_eq!(pluralize("user"), "users");
/// assert_eq!(pluralize("class"), "classes");
/// assert_eq!(pluralize("company"), "companies");
/// ```
pub fn pluralize(singular: &str) -> String {
    const VOWELS: [char; 5] = ['a', 'e', 'i', 'o', 'u'];

    if singular.is_empty() {
        return String::new();
    }

    let before_last = singular.chars().rev().nth(1);
    if singular.ends_with('y') && before_last.is_some_and(|c| !VOWELS.contains(&c)) {
        return format!("{}ies", &singular[..singular.len() - 1]);
    }
    if ["s", "sh", "ch", "x", "z"]
        .iter()
        .any(|suffix| singular.ends_with(suffix))
    {
        return format!("{}es", singular);
    }
    format!("{}s", singular)
}
