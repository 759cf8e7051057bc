//! Partition table retrieval.

use tracing::info;

use crate::error::DaError;
use crate::events::DaObserver;
use crate::protocol::command;
use crate::protocol::constants::*;
use crate::protocol::{field, parse_hex_u64};
use crate::transport::UsbTransport;

use super::DaContext;
use super::transfer::{AckCadence, fetch_via_upload};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionEntry {
    pub name: String,
    pub start: u64,
    pub size: u64,
}

/// Split a partition table payload on `<pt>` and decode each entry.
///
/// Text before the first `<pt>` is the document header and is skipped.
pub fn parse_partition_table(payload: &str) -> Result<Vec<PartitionEntry>, DaError> {
    payload
        .split("<pt>")
        .skip(1)
        .map(|item| {
            let name = field(item, "name");
            let number = |tag: &str| {
                let raw = field(item, tag);
                parse_hex_u64(raw).ok_or_else(|| {
                    DaError::Extraction(format!("partition '{}': bad {} '{}'", name, tag, raw))
                })
            };
            Ok(PartitionEntry {
                name: name.to_string(),
                start: number("start")?,
                size: number("size")?,
            })
        })
        .collect()
}

/// Read the partition table; `None` when the device declines.
pub fn read_partition_table<T: UsbTransport, O: DaObserver>(
    ctx: &mut DaContext<'_, T, O>,
) -> Result<Option<Vec<PartitionEntry>>, DaError> {
    let xml = command::read_partition_table(HOST_MEM_PARTITION_TABLE, RESPONSE_WINDOW);
    let Some(data) = fetch_via_upload(ctx, &xml, AckCadence::Double)? else {
        info!("Partition table not available");
        return Ok(None);
    };
    let table = parse_partition_table(&String::from_utf8_lossy(&data))?;
    info!(count = table.len(), "Partition table read");
    Ok(Some(table))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::events::NullObserver;
    use crate::protocol::DataType;

    const TABLE: &str = "<?xml version=\"1.0\" encoding=\"utf-8\"?><partition_table>\
        <pt><name>preloader</name><start>0x0</start><size>0x40000</size></pt>\
        <pt><name>userdata</name><start>0x1A000000</start><size>0x3000000000</size></pt>\
        </partition_table>";

    #[test]
    fn test_parse_two_entries() {
        let table = parse_partition_table(TABLE).unwrap();
        assert_eq!(
            table,
            vec![
                PartitionEntry {
                    name: "preloader".into(),
                    start: 0,
                    size: 0x40000,
                },
                PartitionEntry {
                    name: "userdata".into(),
                    start: 0x1A000000,
                    size: 0x3000000000,
                },
            ]
        );
    }

    #[test]
    fn test_parse_empty_table() {
        assert!(parse_partition_table("<partition_table></partition_table>").unwrap().is_empty());
    }

    #[test]
    fn test_parse_bad_number() {
        let err = parse_partition_table("<pt><name>boot</name><start>zz</start><size>0x1</size>")
            .unwrap_err();
        assert!(matches!(err, DaError::Extraction(_)));
    }

    #[test]
    fn test_read_partition_table_double_ack() {
        let link = link();
        let mut state = state();
        let mut ctx = DaContext::new(&link, &NullObserver, &mut state);

        link.inner().queue_text("OK");
        link.inner().queue_command(
            CMD_UPLOAD_FILE,
            "<checksum>CHK_NO</checksum><info>WriteLocalFile</info>\
             <target_file>MEM://0x7fe83c538720:0x200000</target_file>",
        );
        link.inner().queue_text(&format!("OK@0x{:x}", TABLE.len()));
        link.inner().queue_text("OK");
        link.inner().queue_frame(DataType::ProtocolFlow, TABLE.as_bytes());
        queue_end_ok_start(&link);

        let table = read_partition_table(&mut ctx).unwrap().unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(link.inner().pending(), 0);

        // upload ack, length ack, OK ack, data ack, two END acks, START ack
        let texts = link.inner().written_texts();
        assert_eq!(texts.len(), 8);
        assert!(texts[1..].iter().all(|t| t == "OK"));
    }

    #[test]
    fn test_read_partition_table_unsupported() {
        let link = link();
        let mut state = state();
        let mut ctx = DaContext::new(&link, &NullObserver, &mut state);

        link.inner().queue_text("OK");
        link.inner().queue_command(
            CMD_END,
            "<result>ERR</result><message>Unsupported partition type</message>",
        );

        assert!(read_partition_table(&mut ctx).unwrap().is_none());
    }
}
