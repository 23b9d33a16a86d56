//! Parsers for the output of the cluster and disk tools.

use serde::Deserialize;

/// Partition type GUID `sgdisk` reports for a prepared object-storage data partition.
pub const OSD_PARTITION_GUID: &str = "4FBD7E29-9D25-41B8-AFD0-062C0CEFF05D";

/// Monitor states that count as being in quorum.
const QUORUM_STATES: [&str; 2] = ["leader", "peon"];

#[derive(Debug, Deserialize)]
struct MonStatus {
    state: String,
}

/// Extracts the key from `ceph auth get-or-create` keyring output:
///
/// ```text
/// [client.bootstrap-osd]
///     key = AQD...==
/// ```
pub fn parse_key(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let (name, value) = line.split_once('=')?;
        if name.trim() != "key" {
            return None;
        }

        // base64 keys end in '='; only the first separator splits name from value
        let value = value.trim();
        (!value.is_empty()).then(|| value.to_string())
    })
}

/// Whether `mon_status` JSON reports a quorum member state.
pub fn parse_in_quorum(output: &str) -> Result<bool, serde_json::Error> {
    let status: MonStatus = serde_json::from_str(output)?;

    Ok(QUORUM_STATES.contains(&status.state.as_str()))
}

/// Whether `sgdisk -i 1` output describes an object-storage data partition.
pub fn is_osd_partition_info(output: &str) -> bool {
    output.lines().any(|line| {
        line.trim()
            .strip_prefix("Partition GUID code:")
            .is_some_and(|rest| rest.trim().to_ascii_uppercase().starts_with(OSD_PARTITION_GUID))
    })
}

/// Whether `partition` appears as a whole word in a mount table.
pub fn mount_table_contains(table: &str, partition: &str) -> bool {
    table
        .lines()
        .flat_map(str::split_whitespace)
        .any(|field| field == partition)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key() {
        let output = "[client.bootstrap-osd]\n\tkey = AQBkZ2VzdGtleQ==\n";
        assert_eq!(parse_key(output), Some("AQBkZ2VzdGtleQ==".to_string()));
    }

    #[test]
    fn test_parse_key_missing() {
        assert_eq!(parse_key("[client.radosgw.gateway]\n"), None);
        assert_eq!(parse_key("\tkey = \n"), None);
        assert_eq!(parse_key("\tcaps mon = \"allow r\"\n"), None);
    }

    #[test]
    fn test_parse_in_quorum() {
        assert!(parse_in_quorum(r#"{"name":"a","rank":0,"state":"leader"}"#).unwrap());
        assert!(parse_in_quorum(r#"{"state":"peon"}"#).unwrap());
        assert!(!parse_in_quorum(r#"{"state":"probing"}"#).unwrap());
        assert!(!parse_in_quorum(r#"{"state":"electing"}"#).unwrap());
        assert!(parse_in_quorum("not json").is_err());
    }

    #[test]
    fn test_is_osd_partition_info() {
        let prepared = "Partition GUID code: 4FBD7E29-9D25-41B8-AFD0-062C0CEFF05D (Unknown)\n\
                        Partition unique GUID: 0D7A3E8E-0B5F-4C43-9A4F-2E7E7D0C2B11\n";
        let linux = "Partition GUID code: 0FC63DAF-8483-4772-8E79-3D69D8477DE4 (Linux filesystem)\n";

        assert!(is_osd_partition_info(prepared));
        assert!(!is_osd_partition_info(linux));
        assert!(!is_osd_partition_info("Partition #1 does not exist.\n"));
    }

    #[test]
    fn test_mount_table_contains_whole_words_only() {
        let table = "/dev/sda1 / ext4 rw,relatime 0 0\n\
                     /dev/sdb11 /srv xfs rw 0 0\n\
                     tmpfs /run tmpfs rw 0 0\n";

        assert!(mount_table_contains(table, "/dev/sda1"));
        assert!(!mount_table_contains(table, "/dev/sdb1"));
        assert!(!mount_table_contains(table, "/dev/sdc1"));
    }
}
