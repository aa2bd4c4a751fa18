/// Formatting rules for the geocoding request. The links travel in the user prompt.
pub const GEOCODE_SYSTEM_PROMPT: &str = r#"You are given a JSON array of URLs (links) pointing to volunteer opportunity pages.
Task: For each URL produce a JSON object with these exact keys:
  - "latlon": an array [lat, lon] where lat and lon are parseable floats (latitude first),
  - "country": the country for that lat/lon, as a lower-case English name (for example: 'japan').
Requirements (strict):
 - Output MUST be a single valid JSON array and nothing else. Example:
   [ {"latlon": [35.6897, 139.6922], "country": "japan"}, {"latlon": [...], "country": "country"} ]
 - Do NOT include markdown, backticks, commentary, notes, or any extra text.
 - Ensure lat and lon are parseable floats and in the order [latitude, longitude].
 - Make sure that the countries are full English names in lower case (no country codes).
 - Return entries in the same order as the input links array. If you cannot find coordinates for a link, omit that link's object entirely.
 - Each array element MUST contain both keys: "latlon" and "country" (if country is unknown, set it to null explicitly).
Reply with only the JSON array (no extra text)."#;

/// The link list, in crawl order, as a JSON array.
pub fn geocode_user_prompt(links: &[String]) -> String {
    let body = serde_json::to_string(links).unwrap_or_else(|_| "[]".to_string());
    format!("Input links array:\n{body}")
}
