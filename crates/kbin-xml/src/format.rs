//! The kbin type table.
//!
//! Every value-bearing node in a kbin file carries a one-byte type id. The id
//! selects the primitive storage of each element, how many elements make up
//! one value (the arity), and how the value is rendered as text. Ids 46, 190
//! and 191 are structural records rather than value types.

use std::fmt;
use std::sync::OnceLock;

use byteorder::{BigEndian, ByteOrder};
use rustc_hash::FxHashMap;

/// Bit set on a type byte when the payload repeats the type's arity.
pub const ARRAY_FLAG: u8 = 0x40;

/// Type id of a container node with no payload.
pub const VOID: u8 = 1;
/// Type id of opaque binary payloads.
pub const BINARY: u8 = 10;
/// Type id of text payloads.
pub const STRING: u8 = 11;
/// Type id of attribute records.
pub const ATTR: u8 = 46;
/// Type id of the record closing the current node.
pub const NODE_END: u8 = 190;
/// Type id of the record terminating the node stream.
pub const END_SECTION: u8 = 191;

/// Primitive storage of a single element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Storage {
    /// Signed 8-bit integer.
    S8,
    /// Unsigned 8-bit integer.
    U8,
    /// Signed 16-bit integer.
    S16,
    /// Unsigned 16-bit integer.
    U16,
    /// Signed 32-bit integer.
    S32,
    /// Unsigned 32-bit integer.
    U32,
    /// Signed 64-bit integer.
    S64,
    /// Unsigned 64-bit integer.
    U64,
    /// IEEE 754 single precision.
    Float,
    /// IEEE 754 double precision.
    Double,
}

impl Storage {
    /// Size of one element in bytes.
    pub const fn width(self) -> usize {
        match self {
            Self::S8 | Self::U8 => 1,
            Self::S16 | Self::U16 => 2,
            Self::S32 | Self::U32 | Self::Float => 4,
            Self::S64 | Self::U64 | Self::Double => 8,
        }
    }

    /// Parse a decimal integer or float and append its big-endian bytes.
    ///
    /// Returns `None` if the text is not a valid value of this storage.
    fn parse_number(self, text: &str, out: &mut Vec<u8>) -> Option<()> {
        let text = text.trim();
        match self {
            Self::S8 => out.push(text.parse::<i8>().ok()? as u8),
            Self::U8 => out.push(text.parse::<u8>().ok()?),
            Self::S16 => out.extend_from_slice(&text.parse::<i16>().ok()?.to_be_bytes()),
            Self::U16 => out.extend_from_slice(&text.parse::<u16>().ok()?.to_be_bytes()),
            Self::S32 => out.extend_from_slice(&text.parse::<i32>().ok()?.to_be_bytes()),
            Self::U32 => out.extend_from_slice(&text.parse::<u32>().ok()?.to_be_bytes()),
            Self::S64 => out.extend_from_slice(&text.parse::<i64>().ok()?.to_be_bytes()),
            Self::U64 => out.extend_from_slice(&text.parse::<u64>().ok()?.to_be_bytes()),
            // parse as double first so single precision rounds exactly once from f64
            Self::Float => {
                out.extend_from_slice(&(text.parse::<f64>().ok()? as f32).to_be_bytes())
            }
            Self::Double => out.extend_from_slice(&text.parse::<f64>().ok()?.to_be_bytes()),
        }
        Some(())
    }

    /// Render one big-endian element; `bytes` must be exactly `width()` long.
    fn format_number(self, bytes: &[u8], format: TextFormat) -> String {
        match self {
            Self::S8 => (bytes[0] as i8).to_string(),
            Self::U8 => bytes[0].to_string(),
            Self::S16 => BigEndian::read_i16(bytes).to_string(),
            Self::U16 => BigEndian::read_u16(bytes).to_string(),
            Self::S32 => BigEndian::read_i32(bytes).to_string(),
            Self::U32 if format == TextFormat::Ip4 => {
                format!("{}.{}.{}.{}", bytes[0], bytes[1], bytes[2], bytes[3])
            }
            Self::U32 => BigEndian::read_u32(bytes).to_string(),
            Self::S64 => BigEndian::read_i64(bytes).to_string(),
            Self::U64 => BigEndian::read_u64(bytes).to_string(),
            Self::Float => format_float(BigEndian::read_f32(bytes) as f64),
            Self::Double => format_float(BigEndian::read_f64(bytes)),
        }
    }
}

/// Fixed-precision float rendering: six decimals, lowercase specials.
fn format_float(value: f64) -> String {
    if value.is_nan() {
        "nan".to_string()
    } else if value.is_infinite() {
        let sign = if value < 0.0 { "-" } else { "" };
        format!("{}inf", sign)
    } else {
        format!("{:.6}", value)
    }
}

/// Parse a dotted-quad IPv4 address into its four network-order bytes.
fn parse_ip4(text: &str, out: &mut Vec<u8>) -> Option<()> {
    let mut octets = [0u8; 4];
    let mut parts = text.trim().split('.');
    for octet in &mut octets {
        *octet = parts.next()?.trim().parse().ok()?;
    }
    if parts.next().is_some() {
        return None;
    }
    out.extend_from_slice(&octets);
    Some(())
}

/// Number of elements making up one value of a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// A fixed element count (1, 2, 3, 4, 8 or 16).
    Fixed(usize),
    /// Length given by a leading byte count in the data stream.
    Variable,
}

/// How scalar elements are rendered to and parsed from text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextFormat {
    /// Plain decimal integers.
    Integer,
    /// Floats with six fixed decimals.
    Float,
    /// Dotted-quad IPv4 address.
    Ip4,
    /// Lowercase hex pairs (binary payloads).
    Hex,
    /// Text in the document encoding.
    Text,
    /// No payload.
    None,
}

/// One entry of the type table.
#[derive(Debug, PartialEq, Eq)]
pub struct KbinType {
    /// Numeric id stored in the node stream (without the array flag).
    pub id: u8,
    /// Display names; the first is canonical, the rest are accepted aliases.
    pub names: &'static [&'static str],
    /// Element storage, `None` for `void`.
    pub storage: Option<Storage>,
    /// Elements per value.
    pub arity: Arity,
    /// Text rendering of the payload.
    pub format: TextFormat,
}

impl KbinType {
    const fn void() -> Self {
        Self {
            id: VOID,
            names: &["void"],
            storage: None,
            arity: Arity::Fixed(0),
            format: TextFormat::None,
        }
    }

    const fn variable(id: u8, names: &'static [&'static str], format: TextFormat) -> Self {
        Self {
            id,
            names,
            storage: Some(Storage::U8),
            arity: Arity::Variable,
            format,
        }
    }

    const fn fixed(
        id: u8,
        names: &'static [&'static str],
        storage: Storage,
        arity: usize,
        format: TextFormat,
    ) -> Self {
        Self {
            id,
            names,
            storage: Some(storage),
            arity: Arity::Fixed(arity),
            format,
        }
    }

    /// The `void` entry.
    pub fn void_type() -> &'static KbinType {
        &TYPES[0]
    }

    /// The `str` entry.
    pub fn string() -> &'static KbinType {
        &TYPES[STRING as usize - 1]
    }

    /// Canonical display name, as written to `__type` on decode.
    pub fn name(&self) -> &'static str {
        self.names[0]
    }

    /// Whether this is the payload-less container type.
    pub fn is_void(&self) -> bool {
        self.id == VOID
    }

    /// Whether the payload is opaque binary.
    pub fn is_binary(&self) -> bool {
        self.id == BINARY
    }

    /// Whether the payload is encoded text.
    pub fn is_string(&self) -> bool {
        self.id == STRING
    }

    /// Size of one element in bytes (0 for `void`).
    pub fn element_size(&self) -> usize {
        self.storage.map_or(0, Storage::width)
    }

    /// Byte size of one value (element size × arity); `None` if variable.
    pub fn value_size(&self) -> Option<usize> {
        match self.arity {
            Arity::Fixed(n) => Some(n * self.element_size()),
            Arity::Variable => None,
        }
    }

    /// Parse one whitespace-free text element and append its bytes.
    ///
    /// Only meaningful for scalar types; returns `None` for malformed text.
    pub fn parse_element(&self, text: &str, out: &mut Vec<u8>) -> Option<()> {
        let storage = self.storage?;
        match self.format {
            TextFormat::Ip4 => parse_ip4(text, out),
            TextFormat::Integer | TextFormat::Float => storage.parse_number(text, out),
            TextFormat::Hex | TextFormat::Text | TextFormat::None => None,
        }
    }

    /// Render a run of scalar elements, joined by single spaces.
    pub fn format_elements(&self, bytes: &[u8]) -> String {
        let Some(storage) = self.storage else {
            return String::new();
        };
        bytes
            .chunks_exact(storage.width())
            .map(|chunk| storage.format_number(chunk, self.format))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Look up a value type by its node-stream id.
    ///
    /// Structural ids (`attr`, `nodeEnd`, `endSection`) and unused ids
    /// return `None`; use [`Record::from_id`] to classify any type byte.
    pub fn from_id(id: u8) -> Option<&'static KbinType> {
        match id {
            1..=45 => Some(&TYPES[id as usize - 1]),
            48..=56 => Some(&TYPES[id as usize - 3]),
            _ => None,
        }
    }

    /// Look up a value type by any of its display names.
    pub fn from_name(name: &str) -> Option<&'static KbinType> {
        static BY_NAME: OnceLock<FxHashMap<&'static str, &'static KbinType>> = OnceLock::new();
        BY_NAME
            .get_or_init(|| {
                let mut map = FxHashMap::default();
                for ty in TYPES.iter() {
                    for &name in ty.names {
                        map.insert(name, ty);
                    }
                }
                map.insert("nodeStart", &TYPES[0]);
                map
            })
            .get(name)
            .copied()
    }
}

impl fmt::Display for KbinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Classification of a type byte in the node stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Record {
    /// Opens a new node (including `void`).
    Node(&'static KbinType),
    /// Attaches an attribute to the current node.
    Attribute,
    /// Closes the current node.
    NodeEnd,
    /// Terminates the node stream.
    EndSection,
}

impl Record {
    /// Classify a type id with the array flag already cleared.
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            ATTR => Some(Self::Attribute),
            NODE_END => Some(Self::NodeEnd),
            END_SECTION => Some(Self::EndSection),
            _ => KbinType::from_id(id).map(Self::Node),
        }
    }

    /// Whether a name follows the type byte of this record.
    pub fn has_name(&self) -> bool {
        matches!(self, Self::Node(_) | Self::Attribute)
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Node(ty) => write!(f, "{}", ty),
            Self::Attribute => f.write_str("attr"),
            Self::NodeEnd => f.write_str("nodeEnd"),
            Self::EndSection => f.write_str("endSection"),
        }
    }
}

use Storage::*;
use TextFormat::{Float as F, Integer as I};

/// Value types ordered by id: 1..=45, then 48..=56 (46 is `attr`, 47 unused).
static TYPES: [KbinType; 54] = [
    KbinType::void(),
    KbinType::fixed(2, &["s8"], S8, 1, I),
    KbinType::fixed(3, &["u8"], U8, 1, I),
    KbinType::fixed(4, &["s16"], S16, 1, I),
    KbinType::fixed(5, &["u16"], U16, 1, I),
    KbinType::fixed(6, &["s32"], S32, 1, I),
    KbinType::fixed(7, &["u32"], U32, 1, I),
    KbinType::fixed(8, &["s64"], S64, 1, I),
    KbinType::fixed(9, &["u64"], U64, 1, I),
    KbinType::variable(BINARY, &["bin", "binary"], TextFormat::Hex),
    KbinType::variable(STRING, &["str", "string"], TextFormat::Text),
    KbinType::fixed(12, &["ip4"], U32, 1, TextFormat::Ip4),
    // unix timestamp
    KbinType::fixed(13, &["time"], U32, 1, I),
    KbinType::fixed(14, &["float", "f"], Float, 1, F),
    KbinType::fixed(15, &["double", "d"], Double, 1, F),
    KbinType::fixed(16, &["2s8"], S8, 2, I),
    KbinType::fixed(17, &["2u8"], U8, 2, I),
    KbinType::fixed(18, &["2s16"], S16, 2, I),
    KbinType::fixed(19, &["2u16"], U16, 2, I),
    KbinType::fixed(20, &["2s32"], S32, 2, I),
    KbinType::fixed(21, &["2u32"], U32, 2, I),
    KbinType::fixed(22, &["2s64", "vs64"], S64, 2, I),
    KbinType::fixed(23, &["2u64", "vu64"], U64, 2, I),
    KbinType::fixed(24, &["2f"], Float, 2, F),
    KbinType::fixed(25, &["2d", "vd"], Double, 2, F),
    KbinType::fixed(26, &["3s8"], S8, 3, I),
    KbinType::fixed(27, &["3u8"], U8, 3, I),
    KbinType::fixed(28, &["3s16"], S16, 3, I),
    KbinType::fixed(29, &["3u16"], U16, 3, I),
    KbinType::fixed(30, &["3s32"], S32, 3, I),
    KbinType::fixed(31, &["3u32"], U32, 3, I),
    KbinType::fixed(32, &["3s64"], S64, 3, I),
    KbinType::fixed(33, &["3u64"], U64, 3, I),
    KbinType::fixed(34, &["3f"], Float, 3, F),
    KbinType::fixed(35, &["3d"], Double, 3, F),
    KbinType::fixed(36, &["4s8"], S8, 4, I),
    KbinType::fixed(37, &["4u8"], U8, 4, I),
    KbinType::fixed(38, &["4s16"], S16, 4, I),
    KbinType::fixed(39, &["4u16"], U16, 4, I),
    KbinType::fixed(40, &["4s32", "vs32"], S32, 4, I),
    KbinType::fixed(41, &["4u32", "vu32"], U32, 4, I),
    KbinType::fixed(42, &["4s64"], S64, 4, I),
    KbinType::fixed(43, &["4u64"], U64, 4, I),
    KbinType::fixed(44, &["4f", "vf"], Float, 4, F),
    KbinType::fixed(45, &["4d"], Double, 4, F),
    KbinType::fixed(48, &["vs8"], S8, 16, I),
    KbinType::fixed(49, &["vu8"], U8, 16, I),
    KbinType::fixed(50, &["vs16"], S16, 8, I),
    KbinType::fixed(51, &["vu16"], U16, 8, I),
    KbinType::fixed(52, &["bool", "b"], S8, 1, I),
    KbinType::fixed(53, &["2b"], S8, 2, I),
    KbinType::fixed(54, &["3b"], S8, 3, I),
    KbinType::fixed(55, &["4b"], S8, 4, I),
    KbinType::fixed(56, &["vb"], S8, 16, I),
];
