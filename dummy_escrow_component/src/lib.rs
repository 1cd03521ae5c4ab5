//! # Dummy Escrow Blueprints
//! Stand-ins for the vote-escrow system used to test the lending engine:
//! - `Escrow` mints position NFTs and serves the registry reads (locked value, lock expiry).
//! - `Voter` records votes and pokes and pays out configurable per-claim reward buckets.

use scrypto::prelude::*;

/// Data struct of a dummy vote-escrowed position NFT.
#[derive(ScryptoSbor, NonFungibleData, Clone)]
pub struct PositionData {
    #[mutable]
    pub locked_value: Decimal,
    #[mutable]
    pub lock_end: Instant,
}

#[blueprint]
mod escrow {
    struct Escrow {
        position_manager: ResourceManager,
        position_counter: u64,
    }

    impl Escrow {
        pub fn instantiate_escrow() -> (Global<Escrow>, ResourceAddress) {
            let (address_reservation, component_address) =
                Runtime::allocate_component_address(Escrow::blueprint_id());

            let position_manager: ResourceManager =
                ResourceBuilder::new_integer_non_fungible::<PositionData>(OwnerRole::None)
                    .metadata(metadata! {
                        init {
                            "name" => "Dummy Escrowed Position".to_string(), updatable;
                            "symbol" => "dPOS".to_string(), updatable;
                        }
                    })
                    .mint_roles(mint_roles! {
                        minter => rule!(require(global_caller(component_address)));
                        minter_updater => rule!(deny_all);
                    })
                    .non_fungible_data_update_roles(non_fungible_data_update_roles! {
                        non_fungible_data_updater => rule!(require(global_caller(component_address)));
                        non_fungible_data_updater_updater => rule!(deny_all);
                    })
                    .create_with_no_initial_supply();

            let position_address = position_manager.address();

            let escrow = Self {
                position_manager,
                position_counter: 0,
            }
            .instantiate()
            .prepare_to_globalize(OwnerRole::None)
            .with_address(address_reservation)
            .metadata(metadata! {
                init {
                    "name" => "Dummy Escrow".to_string(), updatable;
                    "description" => "A dummy vote-escrow registry used for testing Riptide".to_string(), updatable;
                }
            })
            .globalize();

            (escrow, position_address)
        }

        pub fn mint_position(&mut self, locked_value: Decimal, lock_end: Instant) -> Bucket {
            self.position_counter += 1;
            self.position_manager.mint_non_fungible(
                &NonFungibleLocalId::integer(self.position_counter),
                PositionData {
                    locked_value,
                    lock_end,
                },
            )
        }

        pub fn locked_value(&self, position_id: NonFungibleLocalId) -> Decimal {
            self.position_manager
                .get_non_fungible_data::<PositionData>(&position_id)
                .locked_value
        }

        pub fn lock_expiry(&self, position_id: NonFungibleLocalId) -> Instant {
            self.position_manager
                .get_non_fungible_data::<PositionData>(&position_id)
                .lock_end
        }

        pub fn set_locked_value(&mut self, position_id: NonFungibleLocalId, locked_value: Decimal) {
            self.position_manager
                .update_non_fungible_data(&position_id, "locked_value", locked_value);
        }

        pub fn set_lock_end(&mut self, position_id: NonFungibleLocalId, lock_end: Instant) {
            self.position_manager
                .update_non_fungible_data(&position_id, "lock_end", lock_end);
        }
    }
}

#[blueprint]
mod voter {
    struct Voter {
        position_address: ResourceAddress,
        reward_vaults: HashMap<ResourceAddress, Vault>,
        reward_amounts: Vec<(ResourceAddress, Decimal)>,
        votes: HashMap<NonFungibleLocalId, (Vec<ComponentAddress>, Vec<Decimal>)>,
        vote_counts: HashMap<NonFungibleLocalId, u64>,
        poke_counts: HashMap<NonFungibleLocalId, u64>,
        claim_counts: HashMap<NonFungibleLocalId, u64>,
    }

    impl Voter {
        pub fn instantiate_voter(position_address: ResourceAddress) -> Global<Voter> {
            Self {
                position_address,
                reward_vaults: HashMap::new(),
                reward_amounts: Vec::new(),
                votes: HashMap::new(),
                vote_counts: HashMap::new(),
                poke_counts: HashMap::new(),
                claim_counts: HashMap::new(),
            }
            .instantiate()
            .prepare_to_globalize(OwnerRole::None)
            .metadata(metadata! {
                init {
                    "name" => "Dummy Voter".to_string(), updatable;
                    "description" => "A dummy voting component used for testing Riptide".to_string(), updatable;
                }
            })
            .globalize()
        }

        pub fn load_rewards(&mut self, funds: Bucket) {
            let address = funds.resource_address();
            if let Some(vault) = self.reward_vaults.get_mut(&address) {
                vault.put(funds);
            } else {
                self.reward_vaults.insert(address, Vault::with_bucket(funds));
            }
        }

        /// Sets the amount of `resource_address` every claim pays out (capped by what is loaded).
        pub fn set_reward_per_claim(&mut self, resource_address: ResourceAddress, amount: Decimal) {
            if let Some(entry) = self
                .reward_amounts
                .iter_mut()
                .find(|(address, _)| *address == resource_address)
            {
                entry.1 = amount;
            } else {
                self.reward_amounts.push((resource_address, amount));
            }
        }

        pub fn claim(&mut self, position_proof: NonFungibleProof) -> Vec<Bucket> {
            let position_proof = position_proof.check_with_message(
                self.position_address,
                "Not a position of this vote-escrow system.",
            );
            let position_id = position_proof
                .non_fungible::<PositionData>()
                .local_id()
                .clone();
            *self.claim_counts.entry(position_id).or_insert(0) += 1;

            let mut rewards: Vec<Bucket> = Vec::new();
            for (address, amount) in self.reward_amounts.clone() {
                let vault = self
                    .reward_vaults
                    .get_mut(&address)
                    .expect("No rewards loaded for this resource.");
                let payout = amount.min(vault.amount());
                rewards.push(vault.take(payout));
            }
            rewards
        }

        pub fn vote(
            &mut self,
            position_proof: NonFungibleProof,
            pools: Vec<ComponentAddress>,
            weights: Vec<Decimal>,
        ) {
            let position_proof = position_proof.check_with_message(
                self.position_address,
                "Not a position of this vote-escrow system.",
            );
            let position_id = position_proof
                .non_fungible::<PositionData>()
                .local_id()
                .clone();
            *self.vote_counts.entry(position_id.clone()).or_insert(0) += 1;
            self.votes.insert(position_id, (pools, weights));
        }

        pub fn poke(&mut self, position_id: NonFungibleLocalId) {
            *self.poke_counts.entry(position_id).or_insert(0) += 1;
        }

        pub fn get_last_vote(
            &self,
            position_id: NonFungibleLocalId,
        ) -> (Vec<ComponentAddress>, Vec<Decimal>) {
            self.votes
                .get(&position_id)
                .cloned()
                .unwrap_or((Vec::new(), Vec::new()))
        }

        pub fn get_vote_count(&self, position_id: NonFungibleLocalId) -> u64 {
            self.vote_counts.get(&position_id).copied().unwrap_or(0)
        }

        pub fn get_poke_count(&self, position_id: NonFungibleLocalId) -> u64 {
            self.poke_counts.get(&position_id).copied().unwrap_or(0)
        }

        pub fn get_claim_count(&self, position_id: NonFungibleLocalId) -> u64 {
            self.claim_counts.get(&position_id).copied().unwrap_or(0)
        }
    }
}
