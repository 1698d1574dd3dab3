//! Address decoding, validation and derivation for one configured network

use std::str::FromStr;

use bitcoin::address::{Address, AddressType, NetworkUnchecked};
use bitcoin::{CompressedPublicKey, Network, PublicKey, Script};

use crate::config::NetworkKind;
use crate::errors::AddressError;

/// Result of validating a destination address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedAddress {
    pub address: Address,
    /// Script-hash destinations are only payable when the adaptor allows them
    pub can_withdrawal: bool,
}

impl ValidatedAddress {
    pub fn canonical(&self) -> String {
        self.address.to_string()
    }
}

/// Encodes and decodes addresses for a single network
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressCodec {
    network: Network,
}

impl AddressCodec {
    pub fn new(network: NetworkKind) -> Self {
        Self {
            network: network.to_bitcoin(),
        }
    }

    pub fn network(&self) -> Network {
        self.network
    }

    /// Decode an address and require it to belong to this network
    pub fn decode(&self, address: &str) -> Result<Address, AddressError> {
        let unchecked = Address::<NetworkUnchecked>::from_str(address.trim())
            .map_err(|e| AddressError::decode(address, e))?;
        if !unchecked.is_valid_for_network(self.network) {
            return Err(AddressError::WrongNetwork {
                address: address.to_string(),
                network: self.network.to_string(),
            });
        }
        Ok(unchecked.assume_checked())
    }

    /// Decode, check the network and report whether the address may be paid to
    pub fn validate(
        &self,
        address: &str,
        allow_script_hash: bool,
    ) -> Result<ValidatedAddress, AddressError> {
        let address = self.decode(address)?;
        let can_withdrawal = !is_script_hash(&address) || allow_script_hash;
        Ok(ValidatedAddress {
            address,
            can_withdrawal,
        })
    }

    /// Pay-to-pubkey-hash address of a key, keeping the form it was supplied in
    pub fn p2pkh_from_bytes(&self, public_key: &[u8]) -> Result<Address, AddressError> {
        let key = PublicKey::from_slice(public_key)
            .map_err(|e| AddressError::InvalidPublicKey(e.to_string()))?;
        Ok(self.p2pkh(&key))
    }

    pub fn p2pkh(&self, key: &PublicKey) -> Address {
        Address::p2pkh(key.pubkey_hash(), self.network)
    }

    /// Native witness address; witness programs always commit to the compressed key
    pub fn p2wpkh(&self, key: &PublicKey) -> Address {
        Address::p2wpkh(&CompressedPublicKey(key.inner), self.network)
    }

    /// Address a locking script pays to, if it is a standard address script
    pub fn address_of(&self, script: &Script) -> Option<Address> {
        Address::from_script(script, self.network).ok()
    }
}

pub fn is_script_hash(address: &Address) -> bool {
    matches!(
        address.address_type(),
        Some(AddressType::P2sh) | Some(AddressType::P2wsh)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const GENERATOR_COMPRESSED: &str =
        "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798";
    const GENERATOR_UNCOMPRESSED: &str = "0479be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798483ada7726a3c4655da4fbfc0e1108a8fd17b448a68554199c47d08ffb10d4b8";

    fn mainnet() -> AddressCodec {
        AddressCodec::new(NetworkKind::Mainnet)
    }

    fn testnet() -> AddressCodec {
        AddressCodec::new(NetworkKind::Testnet)
    }

    #[test]
    fn test_valid_mainnet_addresses() {
        let codec = mainnet();
        for address in [
            "16ftSEQ4ctQFDtVZiUBusQUjRrGhM3JYwe",
            "3MN2Yy9y3tEnNH11CpsanHRRDjuczBMrpJ",
            "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4",
            "bc1qrp33g0q5c5txsp9arysrx4k6zdkfs4nce4xj0gdcccefvpysxf3qccfmv3",
        ] {
            assert!(codec.decode(address).is_ok(), "{address} should be valid");
        }
    }

    #[test]
    fn test_valid_testnet_addresses() {
        let codec = testnet();
        for address in [
            "mnRw8TRyxUVEv1CnfzpahuRr5BeWYsCGES",
            "tb1qw508d6qejxtdg4y5r3zarvary0c5xw7kxpjzsx",
            "tb1qrp33g0q5c5txsp9arysrx4k6zdkfs4nce4xj0gdcccefvpysxf3q0sl5k7",
            "2NCvEci5zfLk8a4dYsxVTQEQgS67nrtv4Wn",
            "2Mww6tED1opzwN2D3rqqKW9z6BdLstdRFpL",
        ] {
            assert!(codec.decode(address).is_ok(), "{address} should be valid");
        }
    }

    #[test]
    fn test_illegal_addresses() {
        let codec = mainnet();
        for address in [
            "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t5",
            "16ftSEQ4ctQFDtVZiUBusQUjRrGhM3KYwe",
            "",
        ] {
            assert!(codec.decode(address).is_err(), "{address} should be invalid");
        }

        let codec = testnet();
        for address in [
            "MnRw8TRyxUVEv1CnfzpahuRr5BeWYsCGES",
            "Tb1qw508d6qejxtdg4y5r3zarvary0c5xw7kxpjzsx",
            "2nCvEci5zfLk8a4dYsxVTQEQgS67nrtv4Wn",
            "2mww6tED1opzwN2D3rqqKW9z6BdLstdRFpL",
        ] {
            assert!(codec.decode(address).is_err(), "{address} should be invalid");
        }
    }

    #[test]
    fn test_network_mismatch() {
        let err = mainnet()
            .decode("mnRw8TRyxUVEv1CnfzpahuRr5BeWYsCGES")
            .unwrap_err();
        assert!(matches!(err, AddressError::WrongNetwork { .. }));
        assert!(testnet()
            .decode("bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4")
            .is_err());
    }

    #[test]
    fn test_p2pkh_keeps_supplied_form() {
        let compressed = hex::decode(GENERATOR_COMPRESSED).unwrap();
        let uncompressed = hex::decode(GENERATOR_UNCOMPRESSED).unwrap();

        let codec = mainnet();
        assert_eq!(
            codec.p2pkh_from_bytes(&compressed).unwrap().to_string(),
            "1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH"
        );
        assert_eq!(
            codec.p2pkh_from_bytes(&uncompressed).unwrap().to_string(),
            "1EHNa6Q4Jz2uvNExL497mE43ikXhwF6kZm"
        );

        let codec = testnet();
        assert_eq!(
            codec.p2pkh_from_bytes(&compressed).unwrap().to_string(),
            "mrCDrCybB6J1vRfbwM5hemdJz73FwDBC8r"
        );
        assert_eq!(
            codec.p2pkh_from_bytes(&uncompressed).unwrap().to_string(),
            "mtoKs9V381UAhUia3d7Vb9GNak8Qvmcsme"
        );
    }

    #[test]
    fn test_p2wpkh_from_either_form() {
        let uncompressed = PublicKey::from_slice(&hex::decode(GENERATOR_UNCOMPRESSED).unwrap())
            .unwrap();
        assert_eq!(
            mainnet().p2wpkh(&uncompressed).to_string(),
            "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4"
        );
        assert_eq!(
            testnet().p2wpkh(&uncompressed).to_string(),
            "tb1qw508d6qejxtdg4y5r3zarvary0c5xw7kxpjzsx"
        );
    }

    #[test]
    fn test_script_hash_policy() {
        let codec = testnet();
        let validated = codec
            .validate("2Mww6tED1opzwN2D3rqqKW9z6BdLstdRFpL", false)
            .unwrap();
        assert!(!validated.can_withdrawal);
        let validated = codec
            .validate("2Mww6tED1opzwN2D3rqqKW9z6BdLstdRFpL", true)
            .unwrap();
        assert!(validated.can_withdrawal);
        let validated = codec
            .validate("mnRw8TRyxUVEv1CnfzpahuRr5BeWYsCGES", false)
            .unwrap();
        assert!(validated.can_withdrawal);
    }

    #[test]
    fn test_invalid_public_key() {
        assert!(matches!(
            mainnet().p2pkh_from_bytes(&[0x02; 10]),
            Err(AddressError::InvalidPublicKey(_))
        ));
    }
}
