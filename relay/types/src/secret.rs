//! One-way auth-key fingerprinting
//!
//! The proxy never stores or displays a client's raw bearer token or API
//! key. Every place that needs to correlate requests by credential — the
//! request log, the admin UI — carries an [`AuthFingerprint`] instead.

mod private
{
  use core::fmt;
  use base64::Engine as _;
  use sha2::{ Digest, Sha256 };

  /// A redacted, stable identifier for an inbound credential.
  ///
  /// Displays as `<alias>@<fingerprint>`, where `alias` is the first four
  /// characters of the raw key (enough to eyeball "is this the same key I
  /// configured" without ever reconstructing it) and `fingerprint` is a
  /// truncated hex-encoded SHA-256 digest of the full key.
  #[ derive( Clone, PartialEq, Eq, Hash ) ]
  pub struct AuthFingerprint
  {
    alias : String,
    digest : String,
  }

  impl AuthFingerprint
  {
    /// Number of hex characters of the digest retained in [`Self::to_string`].
    const DIGEST_DISPLAY_LEN : usize = 12;

    /// Fingerprint a raw credential. The raw value is consumed and never
    /// retained.
    #[ must_use ]
    pub fn new( raw_key : &str ) -> Self
    {
      let alias : String = raw_key.chars().take( 4 ).collect();
      let mut hasher = Sha256::new();
      hasher.update( raw_key.as_bytes() );
      let digest = hasher.finalize();
      let digest = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode( digest );
      Self { alias, digest }
    }

    /// The full fingerprint string, as persisted in the request log.
    #[ must_use ]
    pub fn fingerprint( &self ) -> String
    {
      format!( "{}@{}", self.alias, self.digest )
    }
  }

  impl fmt::Display for AuthFingerprint
  {
    fn fmt( &self, f : &mut fmt::Formatter< '_ > ) -> fmt::Result
    {
      let shown = self.digest.get( ..Self::DIGEST_DISPLAY_LEN ).unwrap_or( &self.digest );
      write!( f, "{}@{shown}", self.alias )
    }
  }

  impl fmt::Debug for AuthFingerprint
  {
    fn fmt( &self, f : &mut fmt::Formatter< '_ > ) -> fmt::Result
    {
      f.debug_struct( "AuthFingerprint" )
        .field( "alias", &self.alias )
        .field( "digest", &"< REDACTED >" )
        .finish()
    }
  }

  #[ cfg( test ) ]
  mod tests
  {
    use super::*;

    #[ test ]
    fn same_key_fingerprints_identically()
    {
      let a = AuthFingerprint::new( "sk-ant-abc123" );
      let b = AuthFingerprint::new( "sk-ant-abc123" );
      assert_eq!( a, b );
    }

    #[ test ]
    fn different_keys_fingerprint_differently()
    {
      let a = AuthFingerprint::new( "sk-ant-abc123" );
      let b = AuthFingerprint::new( "sk-ant-xyz789" );
      assert_ne!( a.fingerprint(), b.fingerprint() );
    }

    #[ test ]
    fn debug_never_reveals_digest()
    {
      let fp = AuthFingerprint::new( "sk-ant-super-secret-value" );
      let debug_output = format!( "{fp:?}" );
      assert!( !debug_output.contains( "super-secret-value" ) );
      assert!( debug_output.contains( "REDACTED" ) );
    }

    #[ test ]
    fn display_truncates_digest()
    {
      let fp = AuthFingerprint::new( "sk-ant-abc123" );
      let shown = fp.to_string();
      let full = fp.fingerprint();
      assert!( full.len() > shown.len() );
      assert!( full.starts_with( &shown[ ..shown.find( '@' ).unwrap() ] ) );
    }
  }
}

crate::mod_interface!
{
  exposed use AuthFingerprint;
}
