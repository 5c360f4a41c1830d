//! Colors used by flatten, fill, resize backgrounds and text watermarks
//!
//! Accepts CSS named colors and `#RGB`, `#RGBA`, `#RRGGBB`, `#RRGGBBAA`
//! hex forms.

use std::fmt;
use std::str::FromStr;

/// An sRGB color with a 0.0..=1.0 alpha
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub alpha: f64,
}

impl Rgba {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, alpha: 1.0 }
    }

    pub const fn white() -> Self {
        Self::rgb(255, 255, 255)
    }

    pub const fn black() -> Self {
        Self::rgb(0, 0, 0)
    }

    pub const fn transparent() -> Self {
        Self {
            r: 0,
            g: 0,
            b: 0,
            alpha: 0.0,
        }
    }

    /// Alpha scaled to a byte
    pub fn alpha_u8(&self) -> u8 {
        (self.alpha.clamp(0.0, 1.0) * 255.0).round() as u8
    }

    /// Resolve a legacy-grammar color argument: a CSS name if known,
    /// otherwise a hex string given without its leading `#`
    pub fn from_legacy_arg(value: &str) -> Result<Self, String> {
        if let Some(named) = named_color(value) {
            return Ok(named);
        }
        parse_hex(&format!("#{}", value))
    }
}

impl fmt::Display for Rgba {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)?;
        if self.alpha < 1.0 {
            write!(f, "{:02x}", self.alpha_u8())?;
        }
        Ok(())
    }
}

impl FromStr for Rgba {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.starts_with('#') {
            parse_hex(s)
        } else {
            named_color(&s.to_lowercase()).ok_or_else(|| format!("Unknown color: {}", s))
        }
    }
}

/// Whether `value` is a `#`-prefixed hex color of 3, 4, 6 or 8 digits
pub fn is_hex_color(value: &str) -> bool {
    parse_hex(value).is_ok()
}

/// Parse `#RGB`, `#RGBA`, `#RRGGBB` or `#RRGGBBAA`
pub fn parse_hex(hex: &str) -> Result<Rgba, String> {
    let digits = hex
        .strip_prefix('#')
        .ok_or_else(|| "Color must start with '#'".to_string())?;
    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(format!("Invalid hex color: {}", hex));
    }

    let nibble = |i: usize| u8::from_str_radix(&digits[i..i + 1], 16).map(|v| v * 17);
    let byte = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16);
    let bad = |_| format!("Invalid hex color: {}", hex);

    match digits.len() {
        3 | 4 => {
            let alpha = if digits.len() == 4 {
                nibble(3).map_err(bad)? as f64 / 255.0
            } else {
                1.0
            };
            Ok(Rgba {
                r: nibble(0).map_err(bad)?,
                g: nibble(1).map_err(bad)?,
                b: nibble(2).map_err(bad)?,
                alpha,
            })
        }
        6 | 8 => {
            let alpha = if digits.len() == 8 {
                byte(6).map_err(bad)? as f64 / 255.0
            } else {
                1.0
            };
            Ok(Rgba {
                r: byte(0).map_err(bad)?,
                g: byte(2).map_err(bad)?,
                b: byte(4).map_err(bad)?,
                alpha,
            })
        }
        n => Err(format!(
            "Color must be #RGB, #RGBA, #RRGGBB or #RRGGBBAA, got {} digits",
            n
        )),
    }
}

/// Look up a CSS named color
pub fn named_color(name: &str) -> Option<Rgba> {
    NAMED_COLORS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, [r, g, b])| Rgba::rgb(*r, *g, *b))
}

static NAMED_COLORS: &[(&str, [u8; 3])] = &[
    ("aliceblue", [240, 248, 255]),
    ("antiquewhite", [250, 235, 215]),
    ("aqua", [0, 255, 255]),
    ("aquamarine", [127, 255, 212]),
    ("azure", [240, 255, 255]),
    ("beige", [245, 245, 220]),
    ("bisque", [255, 228, 196]),
    ("black", [0, 0, 0]),
    ("blanchedalmond", [255, 235, 205]),
    ("blue", [0, 0, 255]),
    ("blueviolet", [138, 43, 226]),
    ("brown", [165, 42, 42]),
    ("burlywood", [222, 184, 135]),
    ("cadetblue", [95, 158, 160]),
    ("chartreuse", [127, 255, 0]),
    ("chocolate", [210, 105, 30]),
    ("coral", [255, 127, 80]),
    ("cornflowerblue", [100, 149, 237]),
    ("cornsilk", [255, 248, 220]),
    ("crimson", [220, 20, 60]),
    ("cyan", [0, 255, 255]),
    ("darkblue", [0, 0, 139]),
    ("darkcyan", [0, 139, 139]),
    ("darkgoldenrod", [184, 134, 11]),
    ("darkgray", [169, 169, 169]),
    ("darkgreen", [0, 100, 0]),
    ("darkgrey", [169, 169, 169]),
    ("darkkhaki", [189, 183, 107]),
    ("darkmagenta", [139, 0, 139]),
    ("darkolivegreen", [85, 107, 47]),
    ("darkorange", [255, 140, 0]),
    ("darkorchid", [153, 50, 204]),
    ("darkred", [139, 0, 0]),
    ("darksalmon", [233, 150, 122]),
    ("darkseagreen", [143, 188, 143]),
    ("darkslateblue", [72, 61, 139]),
    ("darkslategray", [47, 79, 79]),
    ("darkslategrey", [47, 79, 79]),
    ("darkturquoise", [0, 206, 209]),
    ("darkviolet", [148, 0, 211]),
    ("deeppink", [255, 20, 147]),
    ("deepskyblue", [0, 191, 255]),
    ("dimgray", [105, 105, 105]),
    ("dimgrey", [105, 105, 105]),
    ("dodgerblue", [30, 144, 255]),
    ("firebrick", [178, 34, 34]),
    ("floralwhite", [255, 250, 240]),
    ("forestgreen", [34, 139, 34]),
    ("fuchsia", [255, 0, 255]),
    ("gainsboro", [220, 220, 220]),
    ("ghostwhite", [248, 248, 255]),
    ("gold", [255, 215, 0]),
    ("goldenrod", [218, 165, 32]),
    ("gray", [128, 128, 128]),
    ("green", [0, 128, 0]),
    ("greenyellow", [173, 255, 47]),
    ("grey", [128, 128, 128]),
    ("honeydew", [240, 255, 240]),
    ("hotpink", [255, 105, 180]),
    ("indianred", [205, 92, 92]),
    ("indigo", [75, 0, 130]),
    ("ivory", [255, 255, 240]),
    ("khaki", [240, 230, 140]),
    ("lavender", [230, 230, 250]),
    ("lavenderblush", [255, 240, 245]),
    ("lawngreen", [124, 252, 0]),
    ("lemonchiffon", [255, 250, 205]),
    ("lightblue", [173, 216, 230]),
    ("lightcoral", [240, 128, 128]),
    ("lightcyan", [224, 255, 255]),
    ("lightgoldenrodyellow", [250, 250, 210]),
    ("lightgray", [211, 211, 211]),
    ("lightgreen", [144, 238, 144]),
    ("lightgrey", [211, 211, 211]),
    ("lightpink", [255, 182, 193]),
    ("lightsalmon", [255, 160, 122]),
    ("lightseagreen", [32, 178, 170]),
    ("lightskyblue", [135, 206, 250]),
    ("lightslategray", [119, 136, 153]),
    ("lightslategrey", [119, 136, 153]),
    ("lightsteelblue", [176, 196, 222]),
    ("lightyellow", [255, 255, 224]),
    ("lime", [0, 255, 0]),
    ("limegreen", [50, 205, 50]),
    ("linen", [250, 240, 230]),
    ("magenta", [255, 0, 255]),
    ("maroon", [128, 0, 0]),
    ("mediumaquamarine", [102, 205, 170]),
    ("mediumblue", [0, 0, 205]),
    ("mediumorchid", [186, 85, 211]),
    ("mediumpurple", [147, 112, 219]),
    ("mediumseagreen", [60, 179, 113]),
    ("mediumslateblue", [123, 104, 238]),
    ("mediumspringgreen", [0, 250, 154]),
    ("mediumturquoise", [72, 209, 204]),
    ("mediumvioletred", [199, 21, 133]),
    ("midnightblue", [25, 25, 112]),
    ("mintcream", [245, 255, 250]),
    ("mistyrose", [255, 228, 225]),
    ("moccasin", [255, 228, 181]),
    ("navajowhite", [255, 222, 173]),
    ("navy", [0, 0, 128]),
    ("oldlace", [253, 245, 230]),
    ("olive", [128, 128, 0]),
    ("olivedrab", [107, 142, 35]),
    ("orange", [255, 165, 0]),
    ("orangered", [255, 69, 0]),
    ("orchid", [218, 112, 214]),
    ("palegoldenrod", [238, 232, 170]),
    ("palegreen", [152, 251, 152]),
    ("paleturquoise", [175, 238, 238]),
    ("palevioletred", [219, 112, 147]),
    ("papayawhip", [255, 239, 213]),
    ("peachpuff", [255, 218, 185]),
    ("peru", [205, 133, 63]),
    ("pink", [255, 192, 203]),
    ("plum", [221, 160, 221]),
    ("powderblue", [176, 224, 230]),
    ("purple", [128, 0, 128]),
    ("rebeccapurple", [102, 51, 153]),
    ("red", [255, 0, 0]),
    ("rosybrown", [188, 143, 143]),
    ("royalblue", [65, 105, 225]),
    ("saddlebrown", [139, 69, 19]),
    ("salmon", [250, 128, 114]),
    ("sandybrown", [244, 164, 96]),
    ("seagreen", [46, 139, 87]),
    ("seashell", [255, 245, 238]),
    ("sienna", [160, 82, 45]),
    ("silver", [192, 192, 192]),
    ("skyblue", [135, 206, 235]),
    ("slateblue", [106, 90, 205]),
    ("slategray", [112, 128, 144]),
    ("slategrey", [112, 128, 144]),
    ("snow", [255, 250, 250]),
    ("springgreen", [0, 255, 127]),
    ("steelblue", [70, 130, 180]),
    ("tan", [210, 180, 140]),
    ("teal", [0, 128, 128]),
    ("thistle", [216, 191, 216]),
    ("tomato", [255, 99, 71]),
    ("turquoise", [64, 224, 208]),
    ("violet", [238, 130, 238]),
    ("wheat", [245, 222, 179]),
    ("white", [255, 255, 255]),
    ("whitesmoke", [245, 245, 245]),
    ("yellow", [255, 255, 0]),
    ("yellowgreen", [154, 205, 50]),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_short_hex() {
        assert_eq!(parse_hex("#fff").unwrap(), Rgba::white());
        let c = parse_hex("#f008").unwrap();
        assert_eq!((c.r, c.g, c.b), (255, 0, 0));
        assert!((c.alpha - 136.0 / 255.0).abs() < 1e-9);
    }

    #[test]
    fn test_parse_long_hex() {
        assert_eq!(parse_hex("#336699").unwrap(), Rgba::rgb(0x33, 0x66, 0x99));
        assert_eq!(parse_hex("#33669900").unwrap().alpha, 0.0);
    }

    #[test]
    fn test_invalid_hex() {
        assert!(parse_hex("ffffff").is_err());
        assert!(parse_hex("#ggg").is_err());
        assert!(parse_hex("#12345").is_err());
        assert!(!is_hex_color("#zzzzzz"));
    }

    #[test]
    fn test_legacy_arg_prefers_named() {
        assert_eq!(Rgba::from_legacy_arg("red").unwrap(), Rgba::rgb(255, 0, 0));
        assert_eq!(
            Rgba::from_legacy_arg("00ff00").unwrap(),
            Rgba::rgb(0, 255, 0)
        );
        assert!(Rgba::from_legacy_arg("nocolor").is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(Rgba::rgb(255, 0, 16).to_string(), "#ff0010");
        assert_eq!(Rgba::transparent().to_string(), "#00000000");
    }
}
