//! Link-layer addresses.
//!
//! Addresses are fixed-length byte strings compared byte-wise; the all-ones value is broadcast.

use std::fmt::{self, Debug, Display};

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MacAddress<const N: usize>([u8; N]);

/// 48-bit IEEE 802 address used by 802.11.
pub type EthernetAddress = MacAddress<6>;
/// 16-bit 802.15.4 short address.
pub type ShortAddress = MacAddress<2>;
/// 64-bit 802.15.4 extended address.
pub type ExtendedAddress = MacAddress<8>;

impl<const N: usize> MacAddress<N> {
    pub const BROADCAST: MacAddress<N> = MacAddress([0xFF; N]);
    pub const LEN: usize = N;

    pub const fn new(bytes: [u8; N]) -> Self {
        MacAddress(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; N] {
        &self.0
    }

    pub fn is_broadcast(&self) -> bool {
        self.0.iter().all(|byte| *byte == 0xFF)
    }

    /// Deterministic address for a node index: big-endian index in the low bytes.
    pub fn for_node(index: u32) -> Self {
        let mut bytes = [0u8; N];
        let index = index.to_be_bytes();
        let take = N.min(index.len());
        bytes[N - take..].copy_from_slice(&index[index.len() - take..]);
        if N > index.len() {
            // locally administered unicast
            bytes[0] = 0x02;
        }
        MacAddress(bytes)
    }
}

impl<const N: usize> Display for MacAddress<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(":")?;
            }
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl<const N: usize> Debug for MacAddress<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}

/// Addressing mode field of an 802.15.4 frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressingMode {
    NotPresent,
    Short,
    Extended,
}

impl AddressingMode {
    pub fn len(self) -> usize {
        match self {
            AddressingMode::NotPresent => 0,
            AddressingMode::Short => ShortAddress::LEN,
            AddressingMode::Extended => ExtendedAddress::LEN,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Ieee802154Address {
    Short(ShortAddress),
    Extended(ExtendedAddress),
}

impl Ieee802154Address {
    pub fn mode(&self) -> AddressingMode {
        match self {
            Ieee802154Address::Short(_) => AddressingMode::Short,
            Ieee802154Address::Extended(_) => AddressingMode::Extended,
        }
    }
}

impl Display for Ieee802154Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ieee802154Address::Short(address) => Display::fmt(address, f),
            Ieee802154Address::Extended(address) => Display::fmt(address, f),
        }
    }
}

impl Debug for Ieee802154Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}

/// What a MAC needs from its address type.
pub trait LinkAddress: Copy + Eq + Ord + Debug + Display + 'static {
    fn broadcast() -> Self;

    fn is_broadcast(&self) -> bool;

    fn for_node(index: u32) -> Self;

    /// Bytes the address occupies on the wire.
    fn wire_len(&self) -> usize;
}

impl LinkAddress for EthernetAddress {
    fn broadcast() -> Self {
        EthernetAddress::BROADCAST
    }

    fn is_broadcast(&self) -> bool {
        MacAddress::is_broadcast(self)
    }

    fn for_node(index: u32) -> Self {
        MacAddress::for_node(index)
    }

    fn wire_len(&self) -> usize {
        EthernetAddress::LEN
    }
}

impl LinkAddress for Ieee802154Address {
    fn broadcast() -> Self {
        Ieee802154Address::Short(ShortAddress::BROADCAST)
    }

    fn is_broadcast(&self) -> bool {
        match self {
            Ieee802154Address::Short(address) => address.is_broadcast(),
            Ieee802154Address::Extended(address) => address.is_broadcast(),
        }
    }

    fn for_node(index: u32) -> Self {
        Ieee802154Address::Short(ShortAddress::for_node(index))
    }

    fn wire_len(&self) -> usize {
        self.mode().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_is_all_ones() {
        assert!(EthernetAddress::BROADCAST.is_broadcast());
        assert_eq!(EthernetAddress::BROADCAST.as_bytes(), &[0xFF; 6]);
        assert!(!EthernetAddress::new([0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFE]).is_broadcast());
        assert!(<Ieee802154Address as LinkAddress>::broadcast().is_broadcast());
    }

    #[test]
    fn equality_is_bytewise() {
        assert_eq!(EthernetAddress::new([2, 0, 0, 0, 0, 7]), EthernetAddress::for_node(7));
        assert_ne!(ShortAddress::for_node(7), ShortAddress::for_node(8));
        assert_eq!(ShortAddress::for_node(0x0102).as_bytes(), &[1, 2]);
        assert_eq!(ExtendedAddress::for_node(5).as_bytes(), &[2, 0, 0, 0, 0, 0, 0, 5]);
    }

    #[test]
    fn addressing_mode_lengths() {
        assert_eq!(AddressingMode::NotPresent.len(), 0);
        assert_eq!(Ieee802154Address::for_node(3).wire_len(), 2);
        assert_eq!(Ieee802154Address::Extended(ExtendedAddress::for_node(3)).wire_len(), 8);
    }

    #[test]
    fn display_is_colon_hex() {
        assert_eq!(EthernetAddress::for_node(0xAB).to_string(), "02:00:00:00:00:ab");
        assert_eq!(format!("{:?}", ShortAddress::BROADCAST), "ff:ff");
    }
}
