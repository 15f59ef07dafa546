//! Target and port enumeration properties

use proptest::prelude::*;
use radar::top_ports::{expand_ports_ordered, PortPreset};
use radar::utils::shuffle::IndexPermutation;
use radar::utils::target_parser::AddressSpace;
use radar::expand_ports;
use std::collections::HashSet;
use std::net::Ipv4Addr;
use tokio_test::{assert_err, assert_ok};

#[test]
fn test_empty_port_spec_defaults_to_top1000() {
    let ports = assert_ok!(expand_ports(""));
    assert_eq!(ports.len(), 1000);
    assert!(ports.contains(&80));
    assert!(ports.contains(&443));
}

#[test]
fn test_preset_sizes() {
    assert_eq!(PortPreset::Top200.ports().len(), 200);
    assert_eq!(PortPreset::Top1000.ports().len(), 1000);
    assert_eq!(PortPreset::Top5000.ports().len(), 5000);
}

#[test]
fn test_preset_first_then_remaining_ports() {
    let (ports, head) = assert_ok!(expand_ports_ordered("top200,60000-60002,80"));
    assert_eq!(head, 200);
    assert_eq!(&ports[..head], PortPreset::Top200.ports());
    assert_eq!(&ports[head..], &[60000, 60001, 60002]);
}

#[test]
fn test_invalid_port_specs() {
    assert_err!(expand_ports("0"));
    assert_err!(expand_ports("70000"));
    assert_err!(expand_ports("90-80"));
    assert_err!(expand_ports("http"));
}

#[test]
fn test_shuffled_tail_keeps_content() {
    let (ordered, _) = assert_ok!(expand_ports_ordered("1-2000"));
    let shuffled = assert_ok!(expand_ports("1-2000"));
    assert_eq!(ordered.len(), shuffled.len());
    let a: HashSet<u16> = ordered.into_iter().collect();
    let b: HashSet<u16> = shuffled.into_iter().collect();
    assert_eq!(a, b);
}

proptest! {
    #[test]
    fn prop_total_units_is_n_times_k(prefix in 22u8..=32, lo in 1u16..1000, span in 0u16..200) {
        let space = AddressSpace::parse(&format!("10.1.0.0/{}", prefix)).unwrap();
        let ports = expand_ports(&format!("{}-{}", lo, lo + span)).unwrap();
        prop_assert_eq!(space.len(), 1u64 << (32 - prefix as u32));
        prop_assert_eq!(ports.len(), span as usize + 1);
        prop_assert_eq!(
            space.len() * ports.len() as u64,
            (1u64 << (32 - prefix as u32)) * (span as u64 + 1)
        );
    }

    #[test]
    fn prop_block_permutation_visits_every_address(prefix in 24u8..=32, seed in any::<u64>()) {
        let space = AddressSpace::parse(&format!("192.168.0.0/{}", prefix)).unwrap();
        let block = &space.blocks()[0];
        let order = IndexPermutation::with_seed(block.len(), seed);
        let seen: HashSet<_> = order.iter().filter_map(|i| block.nth(i)).collect();
        prop_assert_eq!(seen.len() as u64, block.len());
    }

    #[test]
    fn prop_ranges_contain_their_ends(a in any::<u32>(), len in 0u32..5000) {
        let start = Ipv4Addr::from(a.min(u32::MAX - len));
        let end = Ipv4Addr::from(u32::from(start) + len);
        let space = AddressSpace::parse(&format!("{}-{}", start, end)).unwrap();
        prop_assert_eq!(space.len(), len as u64 + 1);
        prop_assert!(space.blocks()[0].contains(start.into()));
        prop_assert!(space.blocks()[0].contains(end.into()));
    }
}
