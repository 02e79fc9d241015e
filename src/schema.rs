//! Catalogue of the columns below emits per dump category.
//!
//! below's JSON dump keys every cell by its human title (`"IpInPkts/s"`), so the
//! catalogue maps titles to a dotted field name and the OpenMetrics kind.
//! Titles not listed here are reported and skipped.

use serde_json::Value;

use crate::{
    error::SourceError,
    sample::{MetricKind, Scope},
    Time,
};

pub const TIMESTAMP: &str = "Timestamp";
pub const DATETIME: &str = "Datetime";

pub type Row = serde_json::Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricDef {
    pub field: &'static str,
    pub kind: MetricKind,
}

const fn counter(field: &'static str) -> MetricDef {
    MetricDef {
        field,
        kind: MetricKind::Counter,
    }
}
const fn gauge(field: &'static str) -> MetricDef {
    MetricDef {
        field,
        kind: MetricKind::Gauge,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    System,
    Network,
    Cgroup,
    Process,
}
impl Category {
    pub const ALL: [Category; 4] = [
        Category::System,
        Category::Network,
        Category::Cgroup,
        Category::Process,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::Network => "network",
            Self::Cgroup => "cgroup",
            Self::Process => "process",
        }
    }

    pub fn lookup(&self, title: &str) -> Option<MetricDef> {
        self.columns()
            .iter()
            .find(|(t, _)| *t == title)
            .map(|(_, def)| *def)
    }

    /// Columns that identify a row rather than measure something.
    pub fn is_identity(&self, title: &str) -> bool {
        if title == TIMESTAMP || title == DATETIME {
            return true;
        }
        let identity: &[&str] = match self {
            Self::System => &["Hostname", "Kernel Version", "OS Release"],
            Self::Network => &["Interface"],
            Self::Cgroup => &["Name", "Full Path", "Inode"],
            Self::Process => &["Pid", "Ppid", "Comm", "State", "Cgroup", "Cmdline", "Exe Path"],
        };
        identity.contains(&title)
    }

    /// Scope of one row, `None` when its identity columns are missing.
    pub fn scope(&self, row: &Row) -> Option<Scope> {
        match self {
            Self::System | Self::Network => Some(Scope::Host),
            Self::Cgroup => {
                let path = row
                    .get("Full Path")
                    .or_else(|| row.get("Name"))
                    .and_then(Value::as_str)?;
                Some(Scope::Cgroup {
                    path: path.to_owned(),
                })
            }
            Self::Process => {
                let pid = row.get("Pid").and_then(parse_integer)?;
                let pid = u32::try_from(pid).ok()?;
                let comm = row
                    .get("Comm")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_owned();
                Some(Scope::Process { pid, comm })
            }
        }
    }

    pub fn columns(&self) -> &'static [(&'static str, MetricDef)] {
        match self {
            Self::System => SYSTEM,
            Self::Network => NETWORK,
            Self::Cgroup => CGROUP,
            Self::Process => PROCESS,
        }
    }
}
impl core::str::FromStr for Category {
    type Err = SourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| SourceError::UnknownCategory(s.to_owned()))
    }
}
impl core::fmt::Display for Category {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn row_timestamp(row: &Row) -> Option<Time> {
    row.get(TIMESTAMP).and_then(parse_integer)
}

fn parse_integer(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Numeric reading of a cell; `None` for blanks, placeholders and NaN.
pub fn parse_value(value: &Value) -> Option<f64> {
    let value = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => {
            let token = s.split_whitespace().next()?;
            let token = token.strip_suffix('%').unwrap_or(token);
            token.parse::<f64>().ok()?
        }
        _ => return None,
    };
    (!value.is_nan()).then_some(value)
}

const SYSTEM: &[(&str, MetricDef)] = &[
    ("Usage", gauge("cpu.usage_pct")),
    ("User", gauge("cpu.user_pct")),
    ("System", gauge("cpu.system_pct")),
    ("Total", gauge("mem.total_bytes")),
    ("Free", gauge("mem.free_bytes")),
    ("Available", gauge("mem.available_bytes")),
    ("Buffers", gauge("mem.buffers_bytes")),
    ("Cached", gauge("mem.cached_bytes")),
    ("Page In", gauge("vm.pgpgin_per_sec")),
    ("Page Out", gauge("vm.pgpgout_per_sec")),
    ("Swap In", gauge("vm.pswpin_per_sec")),
    ("Swap Out", gauge("vm.pswpout_per_sec")),
    ("Total Interrupts", counter("stat.total_interrupt_ct")),
    ("Context Switches", counter("stat.context_switches")),
    ("Processes Created", counter("stat.procs_created")),
    ("Running Processes", gauge("stat.procs_running")),
    ("Blocked Processes", gauge("stat.procs_blocked")),
];

const NETWORK: &[(&str, MetricDef)] = &[
    ("Icmp6InDestUnreachs", counter("icmp6.in_dest_unreachs")),
    ("Icmp6InErrs", counter("icmp6.in_errors")),
    ("Icmp6InMsg/s", gauge("icmp6.in_msgs_per_sec")),
    ("Icmp6OutDestUnreachs", counter("icmp6.out_dest_unreachs")),
    ("Icmp6OutErrs", counter("icmp6.out_errors")),
    ("Icmp6OutMsg/s", gauge("icmp6.out_msgs_per_sec")),
    ("IcmpInDestUnreachs", counter("icmp.in_dest_unreachs")),
    ("IcmpInErrs", counter("icmp.in_errors")),
    ("IcmpInMsg/s", gauge("icmp.in_msgs_per_sec")),
    ("IcmpOutDestUnreachs", counter("icmp.out_dest_unreachs")),
    ("IcmpOutErrs", counter("icmp.out_errors")),
    ("IcmpOutMsg/s", gauge("icmp.out_msgs_per_sec")),
    ("Ip6ForwDatagrams/s", gauge("ip6.out_forw_datagrams_per_sec")),
    ("Ip6InAddrErrs", counter("ip6.in_addr_errors")),
    ("Ip6InBcastOctets/s", gauge("ip6.in_bcast_octets_per_sec")),
    ("Ip6InDeliversPkts/s", gauge("ip6.in_delivers_pkts_per_sec")),
    ("Ip6InDiscardsPkts/s", gauge("ip6.in_discards_pkts_per_sec")),
    ("Ip6InHdrErrs", counter("ip6.in_hdr_errors")),
    ("Ip6InMcastOctets/s", gauge("ip6.in_mcast_octets_per_sec")),
    ("Ip6InMcastPkts/s", gauge("ip6.in_mcast_pkts_per_sec")),
    ("Ip6InNoRoutesPkts/s", gauge("ip6.in_no_routes_pkts_per_sec")),
    ("Ip6InOctets/s", gauge("ip6.in_octets_per_sec")),
    ("Ip6InPkts/s", gauge("ip6.in_receives_pkts_per_sec")),
    ("Ip6OutBcastOctets/s", gauge("ip6.out_bcast_octets_per_sec")),
    ("Ip6OutMcastOctets/s", gauge("ip6.out_mcast_octets_per_sec")),
    ("Ip6OutMcastPkts/s", gauge("ip6.out_mcast_pkts_per_sec")),
    ("Ip6OutNoRoutesPkts/s", gauge("ip6.out_no_routes_pkts_per_sec")),
    ("Ip6OutOctets/s", gauge("ip6.out_octets_per_sec")),
    ("Ip6OutReqs/s", gauge("ip6.out_requests_per_sec")),
    ("IpForwDatagrams/s", gauge("ip.forw_datagrams_per_sec")),
    ("IpForwPkts/s", gauge("ip.forwarding_pkts_per_sec")),
    ("IpInBcastOctets/s", gauge("ip.in_bcast_octets_per_sec")),
    ("IpInBcastPkts/s", gauge("ip.in_bcast_pkts_per_sec")),
    ("IpInDeliversPkts/s", gauge("ip.in_delivers_pkts_per_sec")),
    ("IpInDiscardPkts/s", gauge("ip.in_discards_pkts_per_sec")),
    ("IpInMcastOctets/s", gauge("ip.in_mcast_octets_per_sec")),
    ("IpInMcastPkts/s", gauge("ip.in_mcast_pkts_per_sec")),
    ("IpInNoEctPkts/s", gauge("ip.in_no_ect_pkts_per_sec")),
    ("IpInOctets/s", gauge("ip.in_octets_per_sec")),
    ("IpInPkts/s", gauge("ip.in_receives_pkts_per_sec")),
    ("IpOutBcastOctets/s", gauge("ip.out_bcast_octets_per_sec")),
    ("IpOutBcastPkts/s", gauge("ip.out_bcast_pkts_per_sec")),
    ("IpOutDiscardPkts/s", gauge("ip.out_discards_pkts_per_sec")),
    ("IpOutMcastOctets/s", gauge("ip.out_mcast_octets_per_sec")),
    ("IpOutMcastPkts/s", gauge("ip.out_mcast_pkts_per_sec")),
    ("IpOutNoRoutesPkts/s", gauge("ip.out_no_routes_pkts_per_sec")),
    ("IpOutOctets/s", gauge("ip.out_octets_per_sec")),
    ("IpOutReqs/s", gauge("ip.out_requests_per_sec")),
];

const CGROUP: &[(&str, MetricDef)] = &[
    ("Usage Usec", counter("cpu.usage_usec")),
    ("User Usec", counter("cpu.user_usec")),
    ("System Usec", counter("cpu.system_usec")),
    ("CPU Usage", gauge("cpu.usage_pct")),
    ("CPU User", gauge("cpu.user_pct")),
    ("CPU Sys", gauge("cpu.system_pct")),
    ("Nr Period", gauge("cpu.nr_periods_per_sec")),
    ("Nr Throttled", gauge("cpu.nr_throttled_per_sec")),
    ("Throttled", gauge("cpu.throttled_pct")),
    ("Mem Total", gauge("memory.total_bytes")),
    ("Mem Swap", gauge("memory.swap_bytes")),
    ("Anon", gauge("memory.anon_bytes")),
    ("File", gauge("memory.file_bytes")),
    ("OOM Kills", counter("memory.events_oom_kill")),
    ("RBytes", gauge("io.rbytes_per_sec")),
    ("WBytes", gauge("io.wbytes_per_sec")),
    ("R I/O", gauge("io.rios_per_sec")),
    ("W I/O", gauge("io.wios_per_sec")),
];

const PROCESS: &[(&str, MetricDef)] = &[
    ("CPU Usage", gauge("cpu.usage_pct")),
    ("User", gauge("cpu.user_pct")),
    ("Sys", gauge("cpu.system_pct")),
    ("Threads", gauge("cpu.num_threads")),
    ("RSS", gauge("mem.rss_bytes")),
    ("VM Size", gauge("mem.vm_size_bytes")),
    ("Minflt", gauge("mem.minorfaults_per_sec")),
    ("Majflt", gauge("mem.majorfaults_per_sec")),
    ("Reads", gauge("io.rbytes_per_sec")),
    ("Writes", gauge("io.wbytes_per_sec")),
    ("Uptime", gauge("uptime_secs")),
];

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn row(value: Value) -> Row {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_lookup() {
        let def = Category::Network.lookup("IcmpInErrs").unwrap();
        assert_eq!(def.field, "icmp.in_errors");
        assert_eq!(def.kind, MetricKind::Counter);
        let def = Category::Network.lookup("IpInOctets/s").unwrap();
        assert_eq!(def.kind, MetricKind::Gauge);
        assert!(Category::Network.lookup("Bogus").is_none());
        assert_eq!(
            Category::Cgroup.lookup("Usage Usec").unwrap().field,
            "cpu.usage_usec"
        );
    }

    #[test]
    fn test_catalogue_titles_unique() {
        for category in Category::ALL {
            let columns = category.columns();
            for (i, (title, _)) in columns.iter().enumerate() {
                assert!(
                    !columns[i + 1..].iter().any(|(t, _)| t == title),
                    "{category}: duplicate title {title}"
                );
                assert!(!category.is_identity(title));
            }
        }
    }

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value(&json!(12)), Some(12.0));
        assert_eq!(parse_value(&json!("1.5")), Some(1.5));
        assert_eq!(parse_value(&json!("3.2 MB/s")), Some(3.2));
        assert_eq!(parse_value(&json!("45.1%")), Some(45.1));
        assert_eq!(parse_value(&json!("?")), None);
        assert_eq!(parse_value(&json!("")), None);
        assert_eq!(parse_value(&json!("NaN")), None);
        assert_eq!(parse_value(&Value::Null), None);
    }

    #[test]
    fn test_scope() {
        let cgroup = row(json!({"Name": "foo", "Full Path": "/system.slice/foo"}));
        assert_eq!(
            Category::Cgroup.scope(&cgroup),
            Some(Scope::Cgroup {
                path: "/system.slice/foo".into()
            })
        );
        let process = row(json!({"Pid": "42", "Comm": "sshd"}));
        assert_eq!(
            Category::Process.scope(&process),
            Some(Scope::Process {
                pid: 42,
                comm: "sshd".into()
            })
        );
        assert_eq!(Category::Process.scope(&row(json!({"Comm": "x"}))), None);
        assert_eq!(Category::Network.scope(&Row::new()), Some(Scope::Host));
    }

    #[test]
    fn test_category_from_str() {
        assert_eq!("Network".parse::<Category>().unwrap(), Category::Network);
        assert!("disk-ish".parse::<Category>().is_err());
    }
}
