// SPDX-License-Identifier: MIT OR Apache-2.0
//! Bridge to an external cryptographic backend (HSM, KMS, TPM...).
//!
//! The wire protocol for any particular backend is out of scope here; this
//! module only defines the capability boundary `sbsign-core` signs against,
//! plus the process-wide guarantee that at most one external provider is
//! active at a time (two concurrently-active hardware sessions is a real
//! failure mode for HSM-backed keys).

use super::{RawSigner, SignerHandle};
use crate::digest::DigestAlgorithm;
use crate::error::{Result, SignError};
use std::sync::atomic::{AtomicBool, Ordering};
use x509_cert::Certificate;

static EXTERNAL_PROVIDER_ACTIVE: AtomicBool = AtomicBool::new(false);

/// Implemented by an external crypto backend. `init`/`teardown` bracket one
/// signing run; `sign` is called exactly once per invocation of
/// `sbsign-core::sign::run`.
pub trait ExternalCryptoBackend: Send + Sync {
    fn init(&mut self) -> Result<()>;
    fn certificate(&self) -> Result<Certificate>;
    fn sign(&self, digest_alg: DigestAlgorithm, message: &[u8]) -> Result<Vec<u8>>;
    fn teardown(&mut self) -> Result<()>;
}

impl ExternalCryptoBackend for Box<dyn ExternalCryptoBackend> {
    fn init(&mut self) -> Result<()> {
        (**self).init()
    }

    fn certificate(&self) -> Result<Certificate> {
        (**self).certificate()
    }

    fn sign(&self, digest_alg: DigestAlgorithm, message: &[u8]) -> Result<Vec<u8>> {
        (**self).sign(digest_alg, message)
    }

    fn teardown(&mut self) -> Result<()> {
        (**self).teardown()
    }
}

/// Guards the single-active-provider invariant and adapts an
/// [`ExternalCryptoBackend`] into a [`SignerHandle`].
pub struct ExternalProviderGuard<B: ExternalCryptoBackend> {
    backend: B,
}

impl<B: ExternalCryptoBackend> ExternalProviderGuard<B> {
    /// Initializes `backend`, failing if another external provider is
    /// already active in this process.
    pub fn activate(mut backend: B) -> Result<Self> {
        if EXTERNAL_PROVIDER_ACTIVE.swap(true, Ordering::AcqRel) {
            return Err(SignError::sign_failure(
                "another external signing provider is already active in this process",
            ));
        }
        if let Err(e) = backend.init() {
            EXTERNAL_PROVIDER_ACTIVE.store(false, Ordering::Release);
            return Err(e);
        }
        Ok(Self { backend })
    }

    pub fn certificate(&self) -> Result<Certificate> {
        self.backend.certificate()
    }
}

impl<B: ExternalCryptoBackend + 'static> ExternalProviderGuard<B> {
    /// Consumes the guard into a `SignerHandle` bound to this backend's
    /// signing operation. The caller should call
    /// [`ExternalProviderTeardown::teardown`] on the returned value when
    /// done; if it is dropped without that call (e.g. an early return from
    /// a later pipeline stage), `Drop` still releases the active-provider
    /// slot and best-effort tears down the backend.
    pub fn into_handle(self) -> (SignerHandle, ExternalProviderTeardown<B>) {
        let certificate_backend = ExternalBackendSigner(std::sync::Arc::new(std::sync::Mutex::new(self.backend)));
        let handle = SignerHandle::new(Box::new(certificate_backend.clone()));
        (
            handle,
            ExternalProviderTeardown {
                backend: certificate_backend,
                done: false,
            },
        )
    }
}

struct ExternalBackendSigner<B: ExternalCryptoBackend>(std::sync::Arc<std::sync::Mutex<B>>);

impl<B: ExternalCryptoBackend> Clone for ExternalBackendSigner<B> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<B: ExternalCryptoBackend> RawSigner for ExternalBackendSigner<B> {
    fn try_sign_raw(&self, digest_alg: DigestAlgorithm, message: &[u8]) -> Result<Vec<u8>> {
        let backend = self
            .0
            .lock()
            .map_err(|_| SignError::sign_failure("external provider lock poisoned"))?;
        backend.sign(digest_alg, message)
    }
}

/// Releases the single-active-provider slot and tears down the backend.
/// Call [`Self::teardown`] once per successful [`ExternalProviderGuard::activate`]
/// to observe the backend's teardown `Result`; if this value is dropped
/// without that call, `Drop` performs the same release unconditionally so
/// the process-wide slot never sticks after an early-returned pipeline error.
pub struct ExternalProviderTeardown<B: ExternalCryptoBackend> {
    backend: ExternalBackendSigner<B>,
    done: bool,
}

impl<B: ExternalCryptoBackend> ExternalProviderTeardown<B> {
    pub fn teardown(mut self) -> Result<()> {
        let result = self
            .backend
            .0
            .lock()
            .map_err(|_| SignError::sign_failure("external provider lock poisoned"))
            .and_then(|mut backend| backend.teardown());
        EXTERNAL_PROVIDER_ACTIVE.store(false, Ordering::Release);
        self.done = true;
        result
    }
}

impl<B: ExternalCryptoBackend> Drop for ExternalProviderTeardown<B> {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        if let Ok(mut backend) = self.backend.0.lock() {
            let _ = backend.teardown();
        }
        EXTERNAL_PROVIDER_ACTIVE.store(false, Ordering::Release);
    }
}

#[cfg(test)]
pub mod test_support {
    //! A `RecordingBackend` test double: records every digest it is asked
    //! to sign and returns a fixed, recognizable "signature" so call sites
    //! can assert on exactly what reached the provider boundary.

    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    pub struct RecordingBackend {
        pub initialized: bool,
        pub torn_down: bool,
        pub signed_messages: Arc<Mutex<Vec<Vec<u8>>>>,
        pub certificate_der: Vec<u8>,
    }

    impl RecordingBackend {
        pub fn new(certificate_der: Vec<u8>) -> Self {
            Self {
                certificate_der,
                ..Default::default()
            }
        }

        pub fn recorded_messages(&self) -> Vec<Vec<u8>> {
            self.signed_messages.lock().unwrap().clone()
        }
    }

    impl ExternalCryptoBackend for RecordingBackend {
        fn init(&mut self) -> Result<()> {
            self.initialized = true;
            Ok(())
        }

        fn certificate(&self) -> Result<Certificate> {
            use x509_cert::der::Decode;
            Certificate::from_der(&self.certificate_der)
                .map_err(|e| SignError::certificate_load_failure(e.to_string()))
        }

        fn sign(&self, _digest_alg: DigestAlgorithm, message: &[u8]) -> Result<Vec<u8>> {
            self.signed_messages.lock().unwrap().push(message.to_vec());
            Ok(vec![0xAB; 256])
        }

        fn teardown(&mut self) -> Result<()> {
            self.torn_down = true;
            Ok(())
        }
    }
}
