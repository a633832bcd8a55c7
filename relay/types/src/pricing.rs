//! Model price catalog and cost attribution
//!
//! Population of the `model_pricing` table is out of scope for the core (an
//! external collaborator keeps it current); this crate only carries the
//! shape of a price row and the formula that turns token counters plus a
//! price row plus an endpoint's cost multipliers into attributed USD.

mod private
{
  use crate::model::TokenCounters;
  use serde::{ Deserialize, Serialize };

  /// Per-million-token prices for one model, as populated externally into
  /// the `model_pricing` table.
  #[ derive( Debug, Clone, PartialEq, Serialize, Deserialize ) ]
  pub struct ModelPricing
  {
    /// Model name, the table's primary key.
    pub model : String,
    /// Price per 1,000,000 input tokens, in US dollars.
    pub input_price : f64,
    /// Price per 1,000,000 output tokens, in US dollars.
    pub output_price : f64,
    /// Price per 1,000,000 5-minute cache-creation tokens, in US dollars.
    pub cache_creation_5m_price : f64,
    /// Price per 1,000,000 1-hour cache-creation tokens, in US dollars.
    pub cache_creation_1h_price : f64,
    /// Price per 1,000,000 cache-read tokens, in US dollars.
    pub cache_read_price : f64,
  }

  /// The per-category multipliers an endpoint applies on top of catalog
  /// pricing. Mirrors the `cost_multiplier_*` fields on [`crate::model::Endpoint`].
  #[ derive( Debug, Clone, Copy, PartialEq ) ]
  pub struct CostMultipliers
  {
    /// Multiplier applied across every category before the per-category one.
    pub overall : f64,
    /// Input token multiplier.
    pub input : f64,
    /// Output token multiplier.
    pub output : f64,
    /// 5-minute cache-creation token multiplier.
    pub cache_creation_5m : f64,
    /// 1-hour cache-creation token multiplier.
    pub cache_creation_1h : f64,
    /// Cache-read token multiplier.
    pub cache_read : f64,
  }

  const TOKENS_PER_MILLION : f64 = 1_000_000.0;

  /// Attribute a USD cost to a set of token counters against a price row and
  /// an endpoint's multipliers.
  ///
  /// Each category is `tokens / 1e6 × category_price × overall_multiplier ×
  /// category_multiplier`, summed across categories — the `overall`
  /// multiplier and the per-category multiplier compose multiplicatively,
  /// matching the worked example in the routing scenario (§8).
  #[ must_use ]
  pub fn attribute_cost
  (
    tokens : TokenCounters,
    pricing : ModelPricing,
    multipliers : CostMultipliers,
  ) -> f64
  {
    let category = | count : u64, price : f64, per_category : f64 |
    {
      ( count as f64 / TOKENS_PER_MILLION ) * price * multipliers.overall * per_category
    };

    category( tokens.input, pricing.input_price, multipliers.input )
      + category( tokens.output, pricing.output_price, multipliers.output )
      + category( tokens.cache_creation_5m, pricing.cache_creation_5m_price, multipliers.cache_creation_5m )
      + category( tokens.cache_creation_1h, pricing.cache_creation_1h_price, multipliers.cache_creation_1h )
      + category( tokens.cache_read, pricing.cache_read_price, multipliers.cache_read )
  }

  #[ cfg( test ) ]
  mod tests
  {
    use super::*;

    fn unit_multipliers() -> CostMultipliers
    {
      CostMultipliers { overall : 1.0, input : 1.0, output : 1.0, cache_creation_5m : 1.0, cache_creation_1h : 1.0, cache_read : 1.0 }
    }

    #[ test ]
    fn happy_path_matches_worked_example()
    {
      let tokens = TokenCounters { input : 1_000_000, ..TokenCounters::default() };
      let pricing = ModelPricing
      {
        model : "claude-opus-4".to_string(),
        input_price : 3.0,
        output_price : 15.0,
        cache_creation_5m_price : 3.75,
        cache_creation_1h_price : 6.0,
        cache_read_price : 0.3,
      };
      let cost = attribute_cost( tokens, pricing, unit_multipliers() );
      assert!( ( cost - 3.0 ).abs() < f64::EPSILON );
    }

    #[ test ]
    fn overall_and_per_category_multipliers_compose()
    {
      let tokens = TokenCounters { output : 1_000_000, ..TokenCounters::default() };
      let pricing = ModelPricing
      {
        model : "claude-opus-4".to_string(),
        input_price : 0.0,
        output_price : 10.0,
        cache_creation_5m_price : 0.0,
        cache_creation_1h_price : 0.0,
        cache_read_price : 0.0,
      };
      let multipliers = CostMultipliers { overall : 2.0, output : 1.5, ..unit_multipliers() };
      let cost = attribute_cost( tokens, pricing, multipliers );
      assert!( ( cost - 30.0 ).abs() < f64::EPSILON );
    }

    #[ test ]
    fn zero_tokens_cost_nothing()
    {
      let pricing = ModelPricing
      {
        model : "claude-opus-4".to_string(),
        input_price : 3.0,
        output_price : 15.0,
        cache_creation_5m_price : 3.75,
        cache_creation_1h_price : 6.0,
        cache_read_price : 0.3,
      };
      let cost = attribute_cost( TokenCounters::default(), pricing, unit_multipliers() );
      assert_eq!( cost, 0.0 );
    }
  }
}

crate::mod_interface!
{
  exposed use
  {
    ModelPricing,
    CostMultipliers,
    attribute_cost,
  };
}
