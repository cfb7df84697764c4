use lopdf::{Dictionary, Document, Object};

/// Advance used when a font carries no usable `/Widths`, in 1/1000 em.
pub const DEFAULT_GLYPH_WIDTH: f64 = 500.0;
const MONOSPACE_GLYPH_WIDTH: f64 = 600.0;

// Strip subset prefixes ("ABCDEF+") and PostScript suffixes, and map common
// TrueType names onto their standard-14 equivalents.
pub fn sanitize_font_name(raw_name: &str) -> String {
    let without_subset = match raw_name.split_once('+') {
        Some((prefix, rest)) if prefix.len() == 6 && prefix.chars().all(|c| c.is_ascii_uppercase()) => rest,
        _ => raw_name,
    };

    let cleaned = ["PSMT", "MT", "PS"]
        .iter()
        .find_map(|suffix| without_subset.strip_suffix(suffix))
        .unwrap_or(without_subset);

    let (family, style) = match cleaned.split_once(',') {
        Some((family, style)) => (family, Some(style)),
        None => (cleaned, None),
    };

    if let Some(variant) = family.strip_prefix("TimesNewRoman") {
        let variant = style.unwrap_or(variant.trim_start_matches('-'));
        return match variant {
            "Bold" => "Times-Bold",
            "Italic" => "Times-Italic",
            "BoldItalic" => "Times-BoldItalic",
            _ => "Times-Roman",
        }
        .to_string();
    }

    match family {
        "Arial" => "Helvetica".to_string(),
        "ArialBold" | "Arial-Bold" | "Arial-BoldMT" => "Helvetica-Bold".to_string(),
        "CourierNew" => "Courier".to_string(),
        _ => cleaned.to_string(),
    }
}

/// Glyph advance widths for a simple font.
#[derive(Debug, Clone, PartialEq)]
pub struct FontWidths {
    pub first_char: u32,
    pub widths: Vec<f64>,
    pub missing_width: f64,
}

impl FontWidths {
    /// Widths every glyph shares, for fonts without a `/Widths` array.
    pub fn uniform(width: f64) -> Self {
        FontWidths {
            first_char: 0,
            widths: Vec::new(),
            missing_width: width,
        }
    }

    /// Read `/FirstChar` and `/Widths` from a font dictionary, falling back
    /// to a per-family default.
    pub fn from_font_dict(doc: &Document, font: &Dictionary, base_font: &str) -> Self {
        let fallback = fallback_width(base_font);

        let first_char = font
            .get(b"FirstChar")
            .ok()
            .and_then(|obj| resolve(doc, obj).as_i64().ok())
            .and_then(|v| u32::try_from(v).ok());

        let widths = font
            .get(b"Widths")
            .ok()
            .and_then(|obj| resolve(doc, obj).as_array().ok())
            .map(|arr| arr.iter().map(|w| object_as_f64(resolve(doc, w))).collect::<Vec<_>>());

        let missing_width = font
            .get(b"FontDescriptor")
            .ok()
            .and_then(|obj| resolve(doc, obj).as_dict().ok())
            .and_then(|desc| desc.get(b"MissingWidth").ok())
            .map(|obj| object_as_f64(resolve(doc, obj)))
            .filter(|w| *w > 0.0)
            .unwrap_or(fallback);

        match (first_char, widths) {
            (Some(first_char), Some(widths)) if !widths.is_empty() => FontWidths {
                first_char,
                widths,
                missing_width,
            },
            _ => FontWidths::uniform(missing_width),
        }
    }

    /// Advance for a character code, in 1/1000 em.
    pub fn glyph_width(&self, code: u32) -> f64 {
        code.checked_sub(self.first_char)
            .and_then(|idx| self.widths.get(idx as usize))
            .copied()
            .filter(|w| *w > 0.0)
            .unwrap_or(self.missing_width)
    }
}

impl Default for FontWidths {
    fn default() -> Self {
        FontWidths::uniform(DEFAULT_GLYPH_WIDTH)
    }
}

fn fallback_width(base_font: &str) -> f64 {
    if base_font.starts_with("Courier") {
        MONOSPACE_GLYPH_WIDTH
    } else {
        DEFAULT_GLYPH_WIDTH
    }
}

/// Follow a single indirect reference, returning the object itself when it
/// is direct or the reference is dangling.
pub fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    match obj.as_reference() {
        Ok(id) => doc.get_object(id).unwrap_or(obj),
        Err(_) => obj,
    }
}

pub fn object_as_f64(obj: &Object) -> f64 {
    match obj {
        Object::Integer(i) => *i as f64,
        Object::Real(f) => *f as f64,
        _ => 0.0,
    }
}
