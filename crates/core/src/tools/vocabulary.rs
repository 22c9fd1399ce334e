//! Maps everyday object names to the segmentation backend's vocabulary.

/// Spoken category → prompt the segmentation model responds to best.
const VOCABULARY: &[(&str, &str)] = &[
    ("building", "building"),
    ("buildings", "building"),
    ("house", "house"),
    ("houses", "house"),
    ("home", "house"),
    ("homes", "house"),
    ("roof", "roof"),
    ("roofs", "roof"),
    ("rooftops", "roof"),
    ("tree", "tree"),
    ("trees", "tree"),
    ("forest", "tree"),
    ("vegetation", "vegetation"),
    ("grass", "grass"),
    ("car", "car"),
    ("cars", "car"),
    ("vehicle", "vehicle"),
    ("vehicles", "vehicle"),
    ("truck", "truck"),
    ("trucks", "truck"),
    ("road", "road"),
    ("roads", "road"),
    ("street", "road"),
    ("streets", "road"),
    ("water", "water"),
    ("lake", "water"),
    ("lakes", "water"),
    ("river", "water"),
    ("pool", "swimming pool"),
    ("pools", "swimming pool"),
    ("swimming pools", "swimming pool"),
    ("solar panel", "solar panel"),
    ("solar panels", "solar panel"),
    ("boat", "boat"),
    ("boats", "boat"),
    ("ship", "ship"),
    ("ships", "ship"),
    ("parking lot", "parking lot"),
    ("parking lots", "parking lot"),
    ("field", "field"),
    ("fields", "field"),
];

/// Looks a category up case-insensitively. Unknown categories pass through unchanged.
pub fn translate(category: &str) -> String {
    let key = category.trim().to_lowercase();
    VOCABULARY
        .iter()
        .find(|(spoken, _)| *spoken == key)
        .map(|(_, prompt)| prompt.to_string())
        .unwrap_or_else(|| category.to_string())
}
