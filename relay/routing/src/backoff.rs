//! Exponential backoff with jitter for same-candidate retries
//!
//! `delay = min(base * multiplier^(attempt-1), max)`, then jittered by
//! `±jitter_fraction`. Attempt numbering starts at 1.

mod private
{
  use core::time::Duration;
  use rand::Rng;

  /// Tunables for the retry backoff curve.
  #[ derive( Debug, Clone, Copy, PartialEq ) ]
  pub struct BackoffConfig
  {
    base : Duration,
    multiplier : f64,
    max : Duration,
    jitter_fraction : f64,
  }

  impl Default for BackoffConfig
  {
    fn default() -> Self
    {
      Self::new()
    }
  }

  impl BackoffConfig
  {
    /// Explicit constructor; no defaults implied.
    ///
    /// # Panics
    ///
    /// Panics if `multiplier < 1.0` or `jitter_fraction` is outside
    /// `[0.0, 1.0]`.
    #[ must_use ]
    pub fn with_explicit_config( base : Duration, multiplier : f64, max : Duration, jitter_fraction : f64 ) -> Self
    {
      assert!( multiplier >= 1.0, "backoff multiplier must be >= 1.0" );
      assert!( ( 0.0..=1.0 ).contains( &jitter_fraction ), "jitter fraction must be in [0, 1]" );
      Self { base, multiplier, max, jitter_fraction }
    }

    /// Compatibility wrapper with the documented defaults: base 1s,
    /// multiplier 2.0, max 30s, jitter ±15%.
    #[ must_use ]
    pub fn new() -> Self
    {
      Self::with_explicit_config( Duration::from_secs( 1 ), 2.0, Duration::from_secs( 30 ), 0.15 )
    }

    /// Override the base delay.
    #[ must_use ]
    pub fn with_base( mut self, base : Duration ) -> Self
    {
      self.base = base;
      self
    }

    /// Override the backoff multiplier.
    #[ must_use ]
    pub fn with_multiplier( mut self, multiplier : f64 ) -> Self
    {
      self.multiplier = multiplier;
      self
    }

    /// Override the delay ceiling.
    #[ must_use ]
    pub fn with_max( mut self, max : Duration ) -> Self
    {
      self.max = max;
      self
    }

    /// Override the jitter fraction.
    #[ must_use ]
    pub fn with_jitter_fraction( mut self, jitter_fraction : f64 ) -> Self
    {
      self.jitter_fraction = jitter_fraction;
      self
    }

    /// The delay before retry attempt `attempt` (1-based), with jitter
    /// applied.
    #[ allow( clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss ) ]
    #[ must_use ]
    pub fn delay_for( &self, attempt : u32 ) -> Duration
    {
      let exponent = f64::from( attempt.saturating_sub( 1 ) );
      let raw_ms = self.base.as_millis() as f64 * self.multiplier.powf( exponent );
      let capped_ms = raw_ms.min( self.max.as_millis() as f64 );

      let jitter_factor = 1.0 + rand::rng().random_range( -self.jitter_fraction..=self.jitter_fraction );
      let jittered_ms = ( capped_ms * jitter_factor ).max( 0.0 );
      Duration::from_millis( jittered_ms as u64 )
    }
  }

  #[ cfg( test ) ]
  mod tests
  {
    use super::*;

    #[ test ]
    fn first_attempt_is_close_to_base_delay()
    {
      let config = BackoffConfig::new();
      let delay = config.delay_for( 1 );
      assert!( delay.as_millis() >= 850 && delay.as_millis() <= 1150, "{delay:?}" );
    }

    #[ test ]
    fn delay_grows_exponentially_until_capped()
    {
      let config = BackoffConfig::new().with_jitter_fraction( 0.0 );
      assert_eq!( config.delay_for( 1 ), Duration::from_secs( 1 ) );
      assert_eq!( config.delay_for( 2 ), Duration::from_secs( 2 ) );
      assert_eq!( config.delay_for( 3 ), Duration::from_secs( 4 ) );
      assert_eq!( config.delay_for( 6 ), Duration::from_secs( 30 ) );
      assert_eq!( config.delay_for( 10 ), Duration::from_secs( 30 ) );
    }

    #[ test ]
    fn jitter_stays_within_bound()
    {
      let config = BackoffConfig::new().with_jitter_fraction( 0.15 );
      for attempt in 1..=5
      {
        let delay = config.delay_for( attempt ).as_millis();
        let base = config.clone().with_jitter_fraction( 0.0 ).delay_for( attempt ).as_millis();
        let lower = ( base as f64 * 0.85 ) as u128;
        let upper = ( base as f64 * 1.15 ) as u128;
        assert!( delay >= lower && delay <= upper, "attempt {attempt}: {delay} not in [{lower}, {upper}]" );
      }
    }
  }
}

crate::mod_interface!
{
  exposed use BackoffConfig;
}
