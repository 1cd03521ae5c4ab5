#![allow(dead_code)]

use riptide_protocol::riptide_component::riptide_component_test::*;
use riptide_protocol::shared_structs::*;
use dummy_reservoir_component::reservoir_test::*;
use dummy_escrow_component::escrow_test::*;
use dummy_escrow_component::voter_test::*;
use dummy_swap_component::swapper_test::*;
use scrypto_test::prelude::*;

/// One reward epoch in seconds (one week).
pub const EPOCH_LENGTH: i64 = 604_800;
/// Max lock duration of the dummy vote-escrow system: 1460 days (four years).
pub const MAX_LOCK_DURATION: i64 = 126_144_000;

pub struct Helper {
    pub env: TestEnvironment<InMemorySubstateDatabase>,
    pub package_address: PackageAddress,
    pub stable: Bucket,
    pub reward_token: Bucket,
    pub owner_badge: Bucket,
    pub stable_address: ResourceAddress,
    pub reward_token_address: ResourceAddress,
    pub position_address: ResourceAddress,
    pub reservoir_unit_address: ResourceAddress,
    pub loan_receipt_address: ResourceAddress,
    pub reservoir_address: ComponentAddress,
    pub escrow_address: ComponentAddress,
    pub voter_address: ComponentAddress,
    pub swapper_address: ComponentAddress,
    pub riptide: Riptide,
    pub reservoir: Reservoir,
    pub escrow: Escrow,
    pub voter: Voter,
    pub swapper: Swapper,
}

impl Helper {
    pub fn new() -> Result<Self, RuntimeError> {
        let mut env = TestEnvironmentBuilder::new().build();

        let stable = ResourceBuilder::new_fungible(OwnerRole::None)
            .divisibility(18)
            .mint_initial_supply(1000000, &mut env)?;
        let reward_token = ResourceBuilder::new_fungible(OwnerRole::None)
            .divisibility(18)
            .mint_initial_supply(1000000, &mut env)?;

        let stable_address = stable.resource_address(&mut env)?;
        let reward_token_address = reward_token.resource_address(&mut env)?;

        let dummy_reservoir_package_address = PackageFactory::compile_and_publish(
            "./dummy_reservoir_component",
            &mut env,
            CompileProfile::Standard,
        )?;
        let dummy_escrow_package_address = PackageFactory::compile_and_publish(
            "./dummy_escrow_component",
            &mut env,
            CompileProfile::Standard,
        )?;
        let dummy_swap_package_address = PackageFactory::compile_and_publish(
            "./dummy_swap_component",
            &mut env,
            CompileProfile::Standard,
        )?;

        // The reservoir opens with 100 stable units of lendable liquidity.
        let (reservoir, reservoir_unit_address) = Reservoir::instantiate_reservoir(
            stable.take(dec!(100), &mut env)?.into(),
            dummy_reservoir_package_address,
            &mut env,
        )?;

        let (escrow, position_address) =
            Escrow::instantiate_escrow(dummy_escrow_package_address, &mut env)?;

        let mut voter = Voter::instantiate_voter(
            position_address,
            dummy_escrow_package_address,
            &mut env,
        )?;

        // The swapper converts at 1:1 unless a test changes the rate.
        let swapper = Swapper::instantiate_swapper(
            stable.take(dec!(1000), &mut env)?.into(),
            dec!(1),
            dummy_swap_package_address,
            &mut env,
        )?;

        // Stock the voter with stable rewards; per-claim payouts default to zero until a
        // test configures them.
        voter.load_rewards(stable.take(dec!(1000), &mut env)?.into(), &mut env)?;

        let package_address = PackageFactory::compile_and_publish(
            this_package!(),
            &mut env,
            CompileProfile::Standard,
        )?;

        let reservoir_address = ComponentAddress::try_from(reservoir.0.clone()).unwrap();
        let escrow_address = ComponentAddress::try_from(escrow.0.clone()).unwrap();
        let voter_address = ComponentAddress::try_from(voter.0.clone()).unwrap();
        let swapper_address = ComponentAddress::try_from(swapper.0.clone()).unwrap();

        let (mut riptide, owner_badge, loan_receipt_address) = Riptide::instantiate(
            stable_address,
            position_address,
            reservoir_unit_address,
            reservoir_address,
            escrow_address,
            voter_address,
            MAX_LOCK_DURATION,
            package_address,
            &mut env,
        )?;

        env.disable_auth_module();
        riptide.set_swapper(Some(swapper_address), &mut env)?;
        env.enable_auth_module();

        Ok(Self {
            env,
            package_address,
            stable: stable.into(),
            reward_token: reward_token.into(),
            owner_badge,
            stable_address,
            reward_token_address,
            position_address,
            reservoir_unit_address,
            loan_receipt_address,
            reservoir_address,
            escrow_address,
            voter_address,
            swapper_address,
            riptide,
            reservoir,
            escrow,
            voter,
            swapper,
        })
    }

    /////////////////////////////////////////////////
    /////////////////// POSITIONS ///////////////////
    /////////////////////////////////////////////////

    /// Mints a vote-escrowed position locked for `lock_days` with the given locked value.
    pub fn new_position(
        &mut self,
        locked_value: Decimal,
        lock_days: i64,
    ) -> Result<Bucket, RuntimeError> {
        let lock_end = self.env.get_current_time().add_days(lock_days).unwrap();
        self.escrow.mint_position(locked_value, lock_end, &mut self.env)
    }

    /// Mints a position locked for the full four years.
    pub fn new_full_lock_position(&mut self, locked_value: Decimal) -> Result<Bucket, RuntimeError> {
        self.new_position(locked_value, 1460)
    }

    /////////////////////////////////////////////////
    ///////////////////// LOANS /////////////////////
    /////////////////////////////////////////////////

    pub fn request_loan(
        &mut self,
        position: Bucket,
        amount: Decimal,
        zero_balance_option: ZeroBalanceOption,
        payout_account: Option<ComponentAddress>,
    ) -> Result<(Bucket, Bucket), RuntimeError> {
        self.riptide.request_loan(
            position,
            amount,
            zero_balance_option,
            payout_account,
            &mut self.env,
        )
    }

    pub fn pay(
        &mut self,
        position_id: NonFungibleLocalId,
        payment: Bucket,
    ) -> Result<Bucket, RuntimeError> {
        self.riptide.pay(position_id, payment, &mut self.env)
    }

    pub fn claim_rewards(&mut self, position_id: NonFungibleLocalId) -> Result<Decimal, RuntimeError> {
        self.riptide.claim_rewards(position_id, &mut self.env)
    }

    pub fn advance(&mut self, position_id: NonFungibleLocalId) -> Result<Decimal, RuntimeError> {
        self.riptide.advance(position_id, &mut self.env)
    }

    pub fn loan_details(
        &mut self,
        position_id: NonFungibleLocalId,
    ) -> Result<LoanInfoReturn, RuntimeError> {
        self.riptide.get_loan_details(position_id, &mut self.env)
    }

    pub fn max_loan(
        &mut self,
        position_id: NonFungibleLocalId,
    ) -> Result<(Decimal, Decimal), RuntimeError> {
        self.riptide.get_max_loan(position_id, &mut self.env)
    }

    /////////////////////////////////////////////////
    //////////////////// OWNER OPS //////////////////
    /////////////////////////////////////////////////

    pub fn set_default_pools(
        &mut self,
        pools: Vec<ComponentAddress>,
        weights: Vec<Decimal>,
    ) -> Result<(), RuntimeError> {
        self.env.disable_auth_module();
        let result = self.riptide.set_default_pools(pools, weights, &mut self.env);
        self.env.enable_auth_module();
        result
    }

    pub fn set_rewards_rate(&mut self, rewards_rate: Decimal) -> Result<(), RuntimeError> {
        self.env.disable_auth_module();
        self.riptide.set_rewards_rate(rewards_rate, &mut self.env)?;
        self.env.enable_auth_module();
        Ok(())
    }

    pub fn set_multiplier(&mut self, multiplier: Decimal) -> Result<(), RuntimeError> {
        self.env.disable_auth_module();
        self.riptide.set_multiplier(multiplier, &mut self.env)?;
        self.env.enable_auth_module();
        Ok(())
    }

    pub fn set_swapper(&mut self, swapper: Option<ComponentAddress>) -> Result<(), RuntimeError> {
        self.env.disable_auth_module();
        self.riptide.set_swapper(swapper, &mut self.env)?;
        self.env.enable_auth_module();
        Ok(())
    }

    /// Zeroes every rate so reward proceeds pay principal down one for one.
    pub fn zero_all_rates(&mut self) -> Result<(), RuntimeError> {
        self.env.disable_auth_module();
        self.riptide.set_protocol_fee(dec!(0), &mut self.env)?;
        self.riptide.set_lender_premium(dec!(0), &mut self.env)?;
        self.riptide.set_zero_balance_fee(dec!(0), &mut self.env)?;
        self.riptide.set_origination_fee(dec!(0), &mut self.env)?;
        self.env.enable_auth_module();
        Ok(())
    }

    pub fn take_protocol_fees(&mut self) -> Result<Bucket, RuntimeError> {
        self.env.disable_auth_module();
        let fees = self.riptide.take_protocol_fees(&mut self.env);
        self.env.enable_auth_module();
        fees
    }

    /////////////////////////////////////////////////
    //////////////////// TEST HELPERS ///////////////
    /////////////////////////////////////////////////

    /// Moves time forward by exactly one reward epoch.
    pub fn advance_epoch(&mut self) {
        let new_time = self.env.get_current_time().add_days(7).unwrap();
        self.env.set_current_time(new_time);
    }

    /// Configures the dummy voter to pay `amount` of `resource_address` on every claim.
    pub fn set_reward_per_claim(
        &mut self,
        resource_address: ResourceAddress,
        amount: Decimal,
    ) -> Result<(), RuntimeError> {
        self.voter.set_reward_per_claim(resource_address, amount, &mut self.env)
    }

    pub fn reservoir_balance(&mut self) -> Result<Decimal, RuntimeError> {
        self.reservoir.available_balance(&mut self.env)
    }

    pub fn create_account(&mut self) -> Result<Reference, RuntimeError> {
        let account = self
            .env
            .call_function_typed::<_, AccountCreateOutput>(
                ACCOUNT_PACKAGE,
                ACCOUNT_BLUEPRINT,
                ACCOUNT_CREATE_IDENT,
                &AccountCreateInput {},
            )?
            .0;
        Ok(account.0.into())
    }

    pub fn withdraw_from_account(
        &mut self,
        account: Reference,
        resource_address: ResourceAddress,
        amount: Decimal,
    ) -> Result<Bucket, RuntimeError> {
        let bucket = self.env.call_method_typed::<_, _, AccountWithdrawOutput>(
            account.as_node_id().clone(),
            ACCOUNT_WITHDRAW_IDENT,
            &AccountWithdrawInput {
                resource_address,
                amount,
            },
        )?;

        Ok(bucket)
    }

    pub fn assert_bucket_eq(
        &mut self,
        bucket: &Bucket,
        address: ResourceAddress,
        amount: Decimal,
    ) -> Result<(), RuntimeError> {
        assert_eq!(bucket.resource_address(&mut self.env)?, address);
        assert_eq!(bucket.amount(&mut self.env)?, amount);

        Ok(())
    }
}
