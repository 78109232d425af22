//! Share links and QR codes for room codes.
//!
//! A room code travels three ways: typed by hand, as the `roomId` query
//! parameter of a share link, or as a QR code encoding that link.
//!
//! ## Example
//!
//! ```rust,ignore
//! use relaydrop_core::qr;
//!
//! let link = qr::share_link("https://drop.example.com", &code);
//! println!("{}", qr::generate_ascii(&link)?);
//! ```

use qrcode::render::{svg, unicode};
use qrcode::{EcLevel, QrCode};
use url::Url;

use crate::code::RoomCode;
use crate::error::{Error, Result};

/// Query parameter carrying the room code.
pub const ROOM_PARAM: &str = "roomId";

/// Build the share link for `code` under `base_url`.
///
/// # Example
///
/// ```
/// use relaydrop_core::code::RoomCode;
/// use relaydrop_core::qr::share_link;
///
/// let code = RoomCode::parse("482913").unwrap();
/// let link = share_link("https://drop.example.com/", &code);
/// assert_eq!(link, "https://drop.example.com/?tab=receive&roomId=482913");
/// ```
#[must_use]
pub fn share_link(base_url: &str, code: &RoomCode) -> String {
    format!(
        "{}/?tab=receive&{}={}",
        base_url.trim_end_matches('/'),
        ROOM_PARAM,
        code
    )
}

/// Extract the room code from a share link.
///
/// # Errors
///
/// Returns [`Error::InvalidLink`] if `link` is not a URL or has no `roomId`,
/// and [`Error::InvalidCodeFormat`] if the `roomId` is not six digits.
pub fn code_from_link(link: &str) -> Result<RoomCode> {
    let url = Url::parse(link).map_err(|e| Error::InvalidLink(format!("{link}: {e}")))?;
    let room = url
        .query_pairs()
        .find(|(key, _)| key == ROOM_PARAM)
        .map(|(_, value)| value.into_owned())
        .ok_or_else(|| Error::InvalidLink(format!("{link}: no {ROOM_PARAM} parameter")))?;
    RoomCode::parse(&room)
}

/// Accept either a bare room code or a share link.
///
/// # Errors
///
/// Returns an error if `input` is neither a valid code nor a link carrying
/// one.
pub fn parse_code_or_link(input: &str) -> Result<RoomCode> {
    if input.contains("://") {
        code_from_link(input)
    } else {
        RoomCode::parse(input)
    }
}

fn encode(link: &str) -> Result<QrCode> {
    QrCode::with_error_correction_level(link, EcLevel::M)
        .map_err(|e| Error::Internal(format!("Failed to generate QR code: {e}")))
}

/// Generate a QR code of `link` for terminal display.
///
/// Uses Unicode half blocks, two modules per character cell.
///
/// # Errors
///
/// Returns an error if QR code generation fails.
pub fn generate_ascii(link: &str) -> Result<String> {
    let rendered = encode(link)?
        .render::<unicode::Dense1x2>()
        .dark_color(unicode::Dense1x2::Light)
        .light_color(unicode::Dense1x2::Dark)
        .build();

    Ok(rendered)
}

/// Generate an SVG QR code of `link`.
///
/// # Errors
///
/// Returns an error if QR code generation fails.
pub fn generate_svg(link: &str) -> Result<String> {
    let svg_string = encode(link)?
        .render::<svg::Color>()
        .min_dimensions(200, 200)
        .dark_color(svg::Color("#000000"))
        .light_color(svg::Color("#ffffff"))
        .build();

    Ok(svg_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code() -> RoomCode {
        RoomCode::parse("482913").unwrap()
    }

    #[test]
    fn test_share_link_format() {
        assert_eq!(
            share_link("http://localhost:3000", &code()),
            "http://localhost:3000/?tab=receive&roomId=482913"
        );
    }

    #[test]
    fn test_code_from_link() {
        let link = share_link("https://drop.example.com", &code());
        assert_eq!(code_from_link(&link).unwrap(), code());

        let reordered = "https://drop.example.com/?roomId=482913&tab=receive";
        assert_eq!(code_from_link(reordered).unwrap(), code());
    }

    #[test]
    fn test_code_from_link_errors() {
        assert!(matches!(
            code_from_link("not a url"),
            Err(Error::InvalidLink(_))
        ));
        assert!(matches!(
            code_from_link("https://drop.example.com/?tab=receive"),
            Err(Error::InvalidLink(_))
        ));
        assert!(matches!(
            code_from_link("https://drop.example.com/?roomId=12345"),
            Err(Error::InvalidCodeFormat(_))
        ));
    }

    #[test]
    fn test_parse_code_or_link() {
        assert_eq!(parse_code_or_link("482913").unwrap(), code());
        assert_eq!(
            parse_code_or_link("http://localhost:3000/?tab=receive&roomId=482913").unwrap(),
            code()
        );
        assert!(parse_code_or_link("48291").is_err());
    }

    #[test]
    fn test_generate_ascii_multiline() {
        let qr = generate_ascii(&share_link("http://localhost:3000", &code())).unwrap();
        assert!(qr.lines().count() > 5);
        assert!(qr.contains('█') || qr.contains('▀') || qr.contains('▄'));
    }

    #[test]
    fn test_generate_svg_valid_xml() {
        let svg = generate_svg(&share_link("http://localhost:3000", &code())).unwrap();
        assert!(svg.contains("</svg>"));
        assert!(svg.contains("width") && svg.contains("height"));
    }

    #[test]
    fn test_different_codes_produce_different_qrs() {
        let other = RoomCode::parse("100000").unwrap();
        let qr1 = generate_ascii(&share_link("http://h", &code())).unwrap();
        let qr2 = generate_ascii(&share_link("http://h", &other)).unwrap();
        assert_ne!(qr1, qr2);
    }
}
