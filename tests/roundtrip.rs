use secrecy::{ExposeSecret, SecretString};
use std::io::{Read, Write};

use vintage::{scrypt, x25519, DecryptError, Decryptor, Encryptor, Identity, Recipient};

fn encrypt_to(recipients: Vec<&dyn Recipient>, plaintext: &[u8]) -> Vec<u8> {
    let mut encrypted = vec![];
    let e = Encryptor::with_recipients(recipients.into_iter()).unwrap();
    let mut w = e.wrap_output(&mut encrypted).unwrap();
    w.write_all(plaintext).unwrap();
    w.finish().unwrap();
    encrypted
}

fn decrypt_with(
    identities: Vec<&dyn Identity>,
    encrypted: &[u8],
) -> Result<Vec<u8>, DecryptError> {
    let d = Decryptor::new(encrypted)?;
    let mut r = d.decrypt(identities.into_iter())?;
    let mut decrypted = vec![];
    r.read_to_end(&mut decrypted)?;
    Ok(decrypted)
}

#[test]
fn parsed_identity_round_trip() {
    // An identity that has round-tripped through its textual encoding must still
    // decrypt files encrypted to its (also round-tripped) recipient.
    let key: x25519::Identity = {
        let encoded = x25519::Identity::generate().to_string();
        encoded.expose_secret().parse().unwrap()
    };
    let pk: x25519::Recipient = key.to_public().to_string().parse().unwrap();

    let encrypted = encrypt_to(vec![&pk], b"hello\n");
    let decrypted = decrypt_with(vec![&key], &encrypted).unwrap();

    assert_eq!(decrypted, b"hello\n");
}

#[test]
fn empty_plaintext_two_recipients() {
    let key1 = x25519::Identity::generate();
    let key2 = x25519::Identity::generate();

    let encrypted = encrypt_to(vec![&key1.to_public(), &key2.to_public()], b"");

    // Each identity alone suffices.
    assert_eq!(decrypt_with(vec![&key1], &encrypted).unwrap(), b"");
    assert_eq!(decrypt_with(vec![&key2], &encrypted).unwrap(), b"");
}

#[test]
fn many_recipients_round_trip() {
    let keys: Vec<_> = (0..20).map(|_| x25519::Identity::generate()).collect();
    let recipients: Vec<_> = keys.iter().map(|k| k.to_public()).collect();

    let encrypted = encrypt_to(
        recipients.iter().map(|pk| pk as &dyn Recipient).collect(),
        b"data",
    );

    for key in &keys {
        assert_eq!(decrypt_with(vec![key], &encrypted).unwrap(), b"data");
    }
}

#[test]
fn multi_chunk_round_trip() {
    let key = x25519::Identity::generate();

    // Spans two full STREAM chunks plus a partial third.
    let plaintext = vec![0x5a; 150 * 1024];
    let encrypted = encrypt_to(vec![&key.to_public()], &plaintext);

    assert_eq!(decrypt_with(vec![&key], &encrypted).unwrap(), plaintext);
}

#[test]
fn scrypt_round_trip_with_tuned_work_factor() {
    let mut recipient = scrypt::Recipient::new(SecretString::new("password".to_owned())).unwrap();
    recipient.set_work_factor(10);

    let encrypted = encrypt_to(vec![&recipient], b"data");

    let identity = scrypt::Identity::new(SecretString::new("password".to_owned()));
    assert_eq!(decrypt_with(vec![&identity], &encrypted).unwrap(), b"data");
}

#[test]
fn scrypt_work_factor_above_cap_rejected() {
    let mut recipient = scrypt::Recipient::new(SecretString::new("password".to_owned())).unwrap();
    recipient.set_work_factor(10);

    let encrypted = encrypt_to(vec![&recipient], b"data");

    let mut identity = scrypt::Identity::new(SecretString::new("password".to_owned()));
    identity.set_max_work_factor(9);

    let err = decrypt_with(vec![&identity], &encrypted).unwrap_err();
    assert!(matches!(
        err,
        DecryptError::ExcessiveWork {
            required: 10,
            max: 9
        }
    ));
    assert!(err.to_string().contains("scrypt work factor too large"));
}

#[test]
fn wrong_passphrase_looks_like_no_match() {
    let mut recipient = scrypt::Recipient::new(SecretString::new("password".to_owned())).unwrap();
    recipient.set_work_factor(10);

    let encrypted = encrypt_to(vec![&recipient], b"data");

    let identity = scrypt::Identity::new(SecretString::new("wrong".to_owned()));
    let err = decrypt_with(vec![&identity], &encrypted).unwrap_err();
    assert!(matches!(err, DecryptError::NoMatchingKeys));
    assert_eq!(err.to_string(), "no identity matched a recipient");
}

#[test]
fn wrong_x25519_key_looks_like_no_match() {
    let key = x25519::Identity::generate();
    let other = x25519::Identity::generate();

    let encrypted = encrypt_to(vec![&key.to_public()], b"data");

    assert!(matches!(
        decrypt_with(vec![&other], &encrypted).unwrap_err(),
        DecryptError::NoMatchingKeys
    ));
}

#[test]
fn identity_text_encoding_round_trip() {
    let key = x25519::Identity::generate();

    let encoded = key.to_string();
    assert!(encoded.expose_secret().starts_with("AGE-SECRET-KEY-1"));

    let parsed: x25519::Identity = encoded.expose_secret().parse().unwrap();
    assert_eq!(parsed.to_public().to_string(), key.to_public().to_string());
}

#[test]
fn recipient_text_encoding_round_trip() {
    let pk = x25519::Identity::generate().to_public();

    let encoded = pk.to_string();
    assert!(encoded.starts_with("age1"));
    assert_eq!(encoded, encoded.to_lowercase());

    let parsed: x25519::Recipient = encoded.parse().unwrap();
    assert_eq!(parsed.to_string(), encoded);
}

#[test]
fn one_shot_helpers_round_trip() {
    let key = x25519::Identity::generate();

    let ciphertext = vintage::encrypt(&key.to_public(), b"one-shot").unwrap();
    assert_eq!(vintage::decrypt(&key, &ciphertext).unwrap(), b"one-shot");

    // The one-shot output is an ordinary age file.
    let decrypted = decrypt_with(vec![&key], &ciphertext).unwrap();
    assert_eq!(decrypted, b"one-shot");
}

#[test]
fn identities_are_reusable_across_files() {
    let key = x25519::Identity::generate();
    let pk = key.to_public();

    let a = encrypt_to(vec![&pk], b"first");
    let b = encrypt_to(vec![&pk], b"second");

    assert_eq!(decrypt_with(vec![&key], &a).unwrap(), b"first");
    assert_eq!(decrypt_with(vec![&key], &b).unwrap(), b"second");

    // Distinct files never share a header, even for identical plaintext.
    let c = encrypt_to(vec![&pk], b"first");
    assert_ne!(a, c);
}

#[test]
fn decryption_works_with_extra_identities() {
    let key = x25519::Identity::generate();
    let passphrase = scrypt::Identity::new(SecretString::new("unused".to_owned()));

    let encrypted = encrypt_to(vec![&key.to_public()], b"data");

    let identities: Vec<&dyn Identity> = vec![&passphrase, &key];
    let d = Decryptor::new(&encrypted[..]).unwrap();
    let mut r = d.decrypt(identities.into_iter()).unwrap();
    let mut decrypted = vec![];
    r.read_to_end(&mut decrypted).unwrap();

    assert_eq!(decrypted, b"data");
}
