//! Operator-facing renderings of tag data: hex strings, the memory-map
//! text dump, and CSV export of the tag history.

use super::{TagRecord, TagRoster};

/// Uppercase hex byte pairs separated by single spaces.
pub fn to_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parse operator-entered hex, ignoring whitespace.
pub fn parse_hex(text: &str) -> Result<Vec<u8>, hex::FromHexError> {
    let cleaned: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    hex::decode(cleaned)
}

/// Classic hex dump: 16 bytes per line with a pause after eight, ASCII
/// gutter for the printable range. Empty input dumps to nothing.
pub fn hex_dump(data: &[u8]) -> String {
    let mut out = String::new();
    let mut ascii = [0u8; 16];

    for (i, &byte) in data.iter().enumerate() {
        out.push_str(&format!("{byte:02X} "));
        ascii[i % 16] = if (0x20..=0x7E).contains(&byte) {
            byte
        } else {
            b'.'
        };

        let written = i + 1;
        if written % 8 == 0 || written == data.len() {
            out.push(' ');
            if written % 16 == 0 {
                out.push_str(&format!("|  {} \n", String::from_utf8_lossy(&ascii)));
            } else if written == data.len() {
                let used = written % 16;
                if used <= 8 {
                    out.push(' ');
                }
                for _ in used..16 {
                    out.push_str("   ");
                }
                out.push_str(&format!("|  {} \n", String::from_utf8_lossy(&ascii[..used])));
            }
        }
    }
    out
}

/// Textual dump of everything known about a tag, one section per memory
/// area in TID, EPC, user, RFU order.
pub fn memory_map(tag: &TagRecord) -> String {
    let user = tag.user_data();
    let sections: [(&str, &[u8]); 4] = [
        ("Tag ID", &tag.tid),
        ("EPC", &tag.epc),
        ("User data", &user),
        ("RFU", &tag.rfu),
    ];

    let mut dump = String::new();
    for (name, data) in sections {
        dump.push_str(&format!("# {name} ({} bytes)\n", data.len()));
        dump.push_str(&hex_dump(data));
        dump.push('\n');
    }
    dump
}

/// CSV rendering of the tag history. Only identified records (TID and EPC
/// both observed) make it into the table.
pub fn export_csv(roster: &TagRoster) -> String {
    let mut csv = String::from("Tag ID,EPC,User Data,Reserved Data\n");
    for tag in roster.history() {
        if tag.tid.is_empty() || tag.epc.is_empty() {
            continue;
        }
        csv.push_str(&format!(
            "{},{},{},{}\n",
            to_hex(&tag.tid),
            to_hex(&tag.epc),
            to_hex(&tag.user_data()),
            to_hex(&tag.rfu),
        ));
    }
    csv
}
