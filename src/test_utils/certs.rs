use rcgen::BasicConstraints;
use rcgen::Certificate;
use rcgen::CertificateParams;
use rcgen::DnType;
use rcgen::ExtendedKeyUsagePurpose;
use rcgen::IsCa;
use rcgen::KeyPair;
use rustls::pki_types::CertificateDer;

pub struct TestCa {
    pub cert: Certificate,
    pub key: KeyPair,
}

impl TestCa {
    pub fn new(name: &str) -> Self {
        let mut params = CertificateParams::default();
        params.distinguished_name.push(DnType::CommonName, name);
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);

        let key = KeyPair::generate().expect("key generation should succeed");
        let cert = params.self_signed(&key).expect("self-signing should succeed");
        Self { cert, key }
    }

    pub fn der(&self) -> CertificateDer<'static> {
        self.cert.der().clone()
    }

    pub fn pem(&self) -> Vec<u8> {
        self.cert.pem().into_bytes()
    }

    /// Client certificate issued by this CA
    pub fn issue(
        &self,
        name: &str,
    ) -> TestCert {
        let mut params = CertificateParams::default();
        params.distinguished_name.push(DnType::CommonName, name);
        params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ClientAuth];

        let key = KeyPair::generate().expect("key generation should succeed");
        let cert = params
            .signed_by(&key, &self.cert, &self.key)
            .expect("signing should succeed");
        TestCert { cert, key }
    }
}

pub struct TestCert {
    pub cert: Certificate,
    pub key: KeyPair,
}

impl TestCert {
    /// Self-signed leaf, not usable as a CA
    pub fn self_signed(name: &str) -> Self {
        let mut params = CertificateParams::new(vec!["localhost".to_string()]).expect("valid params");
        params.distinguished_name.push(DnType::CommonName, name);

        let key = KeyPair::generate().expect("key generation should succeed");
        let cert = params.self_signed(&key).expect("self-signing should succeed");
        Self { cert, key }
    }

    pub fn der(&self) -> CertificateDer<'static> {
        self.cert.der().clone()
    }

    pub fn pem(&self) -> Vec<u8> {
        self.cert.pem().into_bytes()
    }

    pub fn key_pem(&self) -> Vec<u8> {
        self.key.serialize_pem().into_bytes()
    }
}
