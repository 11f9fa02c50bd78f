//! Byte/string conversions behind the sandbox's `Buffer`
//!
//! `Buffer` itself lives in `prelude.js` as a `Uint8Array` subclass; it
//! calls into these functions for every encoding-aware operation.

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD, URL_SAFE_NO_PAD};
use base64::engine::DecodePaddingMode;
use base64::Engine as _;
use rquickjs::{Ctx, Exception, Function, Object};

/// Encodings `Buffer` accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Utf8,
    Hex,
    Base64,
    Base64Url,
    Latin1,
}

impl Encoding {
    /// Parse a Node encoding name; `None` means the default (utf8)
    pub fn parse(name: Option<&str>) -> Result<Self, String> {
        let Some(name) = name else {
            return Ok(Encoding::Utf8);
        };

        match name.to_ascii_lowercase().as_str() {
            "utf8" | "utf-8" => Ok(Encoding::Utf8),
            "hex" => Ok(Encoding::Hex),
            "base64" => Ok(Encoding::Base64),
            "base64url" => Ok(Encoding::Base64Url),
            "latin1" | "binary" | "ascii" => Ok(Encoding::Latin1),
            other => Err(format!("Unknown encoding: {}", other)),
        }
    }
}

/// Text to bytes
pub fn decode(text: &str, encoding: Encoding) -> Vec<u8> {
    match encoding {
        Encoding::Utf8 => text.as_bytes().to_vec(),
        Encoding::Latin1 => text.chars().map(|c| c as u32 as u8).collect(),
        Encoding::Hex => decode_hex(text),
        Encoding::Base64 | Encoding::Base64Url => decode_base64(text),
    }
}

/// Bytes to text
pub fn encode(bytes: &[u8], encoding: Encoding) -> String {
    match encoding {
        Encoding::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
        Encoding::Latin1 => bytes.iter().map(|&b| b as char).collect(),
        Encoding::Hex => bytes.iter().map(|b| format!("{:02x}", b)).collect(),
        Encoding::Base64 => STANDARD.encode(bytes),
        Encoding::Base64Url => URL_SAFE_NO_PAD.encode(bytes),
    }
}

/// Hex pairs up to the first invalid one, matching Node's lenient parse
fn decode_hex(text: &str) -> Vec<u8> {
    text.as_bytes()
        .chunks_exact(2)
        .map_while(|pair| {
            let hi = (pair[0] as char).to_digit(16)?;
            let lo = (pair[1] as char).to_digit(16)?;
            Some((hi * 16 + lo) as u8)
        })
        .collect()
}

/// Unpadded decoding that keeps whatever bits a short final group carries
const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_allow_trailing_bits(true)
        .with_decode_padding_mode(DecodePaddingMode::RequireNone),
);

/// Accepts both alphabets; skips characters outside them and stops at `=`
///
/// A dangling single character carries no full byte and is dropped.
fn decode_base64(text: &str) -> Vec<u8> {
    let mut sextets: Vec<u8> = text
        .bytes()
        .take_while(|b| *b != b'=')
        .map(|b| match b {
            b'-' => b'+',
            b'_' => b'/',
            b => b,
        })
        .filter(|b| b.is_ascii_alphanumeric() || *b == b'+' || *b == b'/')
        .collect();

    if sextets.len() % 4 == 1 {
        sextets.pop();
    }

    LENIENT.decode(&sextets).unwrap_or_default()
}

/// Install `encode` / `decode` / `byteLength` on the prelude's native object
pub fn install<'js>(ctx: &Ctx<'js>, native: &Object<'js>) -> rquickjs::Result<()> {
    let decode_fn = Function::new(
        ctx.clone(),
        |ctx: Ctx<'js>, text: String, encoding: Option<String>| -> rquickjs::Result<Vec<u8>> {
            let encoding = Encoding::parse(encoding.as_deref())
                .map_err(|msg| Exception::throw_type(&ctx, &msg))?;
            Ok(decode(&text, encoding))
        },
    )?
    .with_name("decode")?;
    native.set("decode", decode_fn)?;

    let encode_fn = Function::new(
        ctx.clone(),
        |ctx: Ctx<'js>, bytes: Vec<u8>, encoding: Option<String>| -> rquickjs::Result<String> {
            let encoding = Encoding::parse(encoding.as_deref())
                .map_err(|msg| Exception::throw_type(&ctx, &msg))?;
            Ok(encode(&bytes, encoding))
        },
    )?
    .with_name("encode")?;
    native.set("encode", encode_fn)?;

    Ok(())
}
