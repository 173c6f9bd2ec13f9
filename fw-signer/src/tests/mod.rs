use {
    self::keys::{PUBKEY_1_BYTES, PUBKEY_1_HEX, PUBKEY_2_HEX, SECRET_1_PEM},
    crate::{package, ExitCode},
    bootloader_core::{
        check_image, mock::ManualClock, mock::RamFlash, mock::ScriptedLink, update_run, Comm, Config,
        FirmwareHeader, Layout, Outcome, Secp256k1Verify, VerificationResult,
    },
    host_protocol::{Opcode, Packet},
    std::io::Write,
};

mod keys;

const IV: [u8; 16] = [0x3C; 16];

/// Sign a firmware file and verify the package with the matching key.
#[test]
fn sign_then_verify() {
    let env = Env::new(1000);
    let output = env.sign(&[]);
    assert_eq!(output.exit_code, ExitCode(0));
    assert!(output.stdout.contains("signed"));
    assert!(output.stderr.is_empty());

    let output = test([
        "verify",
        "--aes-key",
        env.path(&env.aes_key),
        "--pubkey",
        PUBKEY_1_HEX,
        "-i",
        &env.output_path(),
    ]);
    assert_eq!(output.exit_code, ExitCode(0));
    assert!(output.stdout.contains("signature valid"));
    // Prints version.
    assert_eq!(row(&output.stdout, "version"), "5");
    // Prints the default device id.
    assert!(output.stdout.contains("0x69"));
    // Prints firmware size.
    assert!(output.stdout.contains("1000 B (1000)"));
    assert!(output.stderr.is_empty());
}

/// Without --pubkey the key the bootloader is built with is used, which did
/// not sign this package.
#[test]
fn verify_defaults_to_bootloader_key() {
    let env = Env::new(64);
    assert_eq!(env.sign(&[]).exit_code, ExitCode(0));

    let output = test(["verify", "--aes-key", env.path(&env.aes_key), "-i", &env.output_path()]);
    assert_eq!(output.exit_code, ExitCode(1));
    assert!(output.stderr.contains("signature invalid"));
}

#[test]
fn verify_with_other_pubkey() {
    let env = Env::new(64);
    assert_eq!(env.sign(&[]).exit_code, ExitCode(0));

    let output = test([
        "verify",
        "--aes-key",
        env.path(&env.aes_key),
        "--pubkey",
        PUBKEY_2_HEX,
        "-i",
        &env.output_path(),
    ]);
    assert_eq!(output.exit_code, ExitCode(1));
    assert!(output.stderr.contains("signature invalid"));
}

#[test]
fn verify_checks_device_id() {
    let env = Env::new(64);
    assert_eq!(env.sign(&["--device-id", "0x42"]).exit_code, ExitCode(0));

    let output = test([
        "verify",
        "--aes-key",
        env.path(&env.aes_key),
        "--pubkey",
        PUBKEY_1_HEX,
        "--device-id",
        "105",
        "-i",
        &env.output_path(),
    ]);
    assert_eq!(output.exit_code, ExitCode(1));
    assert!(output.stderr.contains("built for device 0x42, expected 0x69"));
}

#[test]
fn verify_with_wrong_aes_key() {
    let env = Env::new(64);
    assert_eq!(env.sign(&[]).exit_code, ExitCode(0));
    let other_key = create_file(&[0x01; 16]);

    let output = test([
        "verify",
        "--aes-key",
        other_key.path().to_str().unwrap(),
        "--pubkey",
        PUBKEY_1_HEX,
        "-i",
        &env.output_path(),
    ]);
    assert_eq!(output.exit_code, ExitCode(1));
    assert!(output.stdout.is_empty());
}

/// The AES key file may hold hex text instead of raw bytes.
#[test]
fn aes_key_as_hex_text() {
    let env = Env::new(64);
    assert_eq!(env.sign(&[]).exit_code, ExitCode(0));
    let hex_key = create_file(format!("{}\n", hex::encode(consts::AES_KEY)).as_bytes());

    let output = test([
        "verify",
        "--aes-key",
        hex_key.path().to_str().unwrap(),
        "--pubkey",
        PUBKEY_1_HEX,
        "-i",
        &env.output_path(),
    ]);
    assert_eq!(output.exit_code, ExitCode(0));
}

#[test]
fn sign_pubkey_mismatch() {
    let env = Env::new(64);
    let output = env.sign(&["--pubkey", PUBKEY_2_HEX]);
    assert_eq!(output.exit_code, ExitCode(1));
    assert!(output.stderr.contains("public key does not match secret key"));
    assert!(std::fs::read(env.output_path()).unwrap().is_empty());
}

#[test]
fn sign_with_matching_pubkey() {
    let env = Env::new(64);
    let output = env.sign(&["--pubkey", PUBKEY_1_HEX]);
    assert_eq!(output.exit_code, ExitCode(0));
}

#[test]
fn sign_without_secret() {
    let env = Env::new(64);
    let output = test([
        "sign",
        "--aes-key",
        env.path(&env.aes_key),
        "-i",
        env.path(&env.input),
        "-o",
        &env.output_path(),
        "--firmware-version",
        "5",
    ]);
    assert_eq!(output.exit_code, ExitCode(1));
    assert!(output.stderr.contains("did not specify a secret key"));
}

#[test]
fn sign_without_firmware_behind_placeholder() {
    let env = Env::new(0);
    let output = env.sign(&[]);
    assert_eq!(output.exit_code, ExitCode(1));
    assert!(output.stderr.contains("holds no firmware"));
}

#[test]
fn sign_with_pkcs8_key() {
    let env = Env::new(64);
    let pkcs8 = create_file(pem::encode(&pem::Pem::new("PRIVATE KEY", vec![0; 32])).as_bytes());
    let output = test([
        "sign",
        "--secret",
        pkcs8.path().to_str().unwrap(),
        "--aes-key",
        env.path(&env.aes_key),
        "-i",
        env.path(&env.input),
        "-o",
        &env.output_path(),
        "--firmware-version",
        "5",
    ]);
    assert_eq!(output.exit_code, ExitCode(1));
    assert!(output.stderr.contains(r#"invalid PEM tag: "PRIVATE KEY""#));
}

/// Keys and device id come from the config file.
#[test]
fn sign_with_config() {
    let env = Env::new(64);
    let config = create_file(
        format!(
            "secret = {:?}\naes_key = {:?}\ndevice_id = \"0x42\"\n",
            env.path(&env.secret),
            env.path(&env.aes_key),
        )
        .as_bytes(),
    );
    let output = test([
        "sign",
        "-c",
        config.path().to_str().unwrap(),
        "-i",
        env.path(&env.input),
        "-o",
        &env.output_path(),
        "--firmware-version",
        "9",
    ]);
    assert_eq!(output.exit_code, ExitCode(0));

    let output = test(["dump", "--aes-key", env.path(&env.aes_key), "-i", &env.output_path()]);
    assert_eq!(output.exit_code, ExitCode(0));
    assert!(output.stdout.contains("0x42"));
    assert_eq!(row(&output.stdout, "version"), "9");
}

/// The secret is given both on the command line and in the config file.
#[test]
fn sign_secret_in_config_and_cli() {
    let env = Env::new(64);
    let config = create_file(format!("secret = {:?}\n", env.path(&env.secret)).as_bytes());
    let output = env.sign(&["-c", config.path().to_str().unwrap()]);
    assert_eq!(output.exit_code, ExitCode(1));
    assert!(output.stderr.contains("secret specified in both config and cli"));
}

#[test]
fn sign_device_id_in_config_and_cli() {
    let env = Env::new(64);
    let config = create_file(b"device_id = \"0x69\"\n");
    let output = env.sign(&["-c", config.path().to_str().unwrap(), "--device-id", "0x69"]);
    assert_eq!(output.exit_code, ExitCode(1));
    assert!(output.stderr.contains("device id specified in both config and cli"));
}

#[test]
fn config_key_path_must_be_absolute() {
    let env = Env::new(64);
    let config = create_file(b"aes_key = \"keys/aes.bin\"\n");
    let output = test([
        "sign",
        "-c",
        config.path().to_str().unwrap(),
        "--secret",
        env.path(&env.secret),
        "-i",
        env.path(&env.input),
        "-o",
        &env.output_path(),
        "--firmware-version",
        "1",
    ]);
    assert_eq!(output.exit_code, ExitCode(1));
    assert!(output.stderr.contains("key path is not absolute"));
}

#[test]
fn config_unknown_field() {
    let env = Env::new(64);
    let config = create_file(b"target = \"nrf52805\"\n");
    let output = env.sign(&["-c", config.path().to_str().unwrap()]);
    assert_eq!(output.exit_code, ExitCode(1));
    assert!(output.stderr.contains("is invalid (expected secret, aes_key and device_id)"));
    assert!(output.stderr.contains(config.path().to_str().unwrap()));
}

#[test]
fn config_file_missing() {
    let env = Env::new(64);
    let output = env.sign(&["-c", "/nonexistent/fw-signer.toml"]);
    assert_eq!(output.exit_code, ExitCode(1));
    assert!(output.stderr.contains("failed to read signing config /nonexistent/fw-signer.toml"));
}

#[test]
fn pubkey_of_secret() {
    let secret = create_file(SECRET_1_PEM);
    let output = test(["pubkey", "--secret", secret.path().to_str().unwrap()]);
    assert_eq!(output.exit_code, ExitCode(0));
    assert_eq!(output.stdout.trim(), PUBKEY_1_HEX);
}

/// Dump an image as the bootloader stores it, with erased flash behind it.
#[test]
fn dump_stored_image() {
    let image = package::Image::sign(b"Hello, world!", 77, 0x69, &secret(), IV).unwrap();
    let mut stored = image.header.to_bytes().to_vec();
    stored.extend_from_slice(&image.firmware);
    stored.resize(512, 0xFF);
    let file = create_file(&stored);

    let output = test(["dump", "-i", file.path().to_str().unwrap()]);
    assert_eq!(output.exit_code, ExitCode(0));
    assert_eq!(row(&output.stdout, "version"), "77");
    assert!(output.stdout.contains("13 B (13)"));
    assert!(output.stdout.contains(&hex::encode(IV)));
    assert!(output.stdout.contains(&hex::encode(image.digest())));
    let signature = hex::encode(image.header.signature);
    let (half_1, half_2) = signature.split_at(signature.len() / 2);
    assert!(output.stdout.contains(half_1));
    assert!(output.stdout.contains(half_2));
}

#[test]
fn dump_truncated_image() {
    let file = create_file(&[0xFF; 100]);
    let output = test(["dump", "-i", file.path().to_str().unwrap()]);
    assert_eq!(output.exit_code, ExitCode(1));
    assert!(output.stderr.contains("shorter than its header"));
}

#[test]
fn package_layout() {
    let firmware = vec![0xA5; 200];
    let image = package::Image::sign(&firmware, 1, 0x69, &secret(), IV).unwrap();
    let sealed = image.seal(&consts::AES_KEY);

    // IV, then header and firmware padded to whole blocks
    assert_eq!(&sealed[..16], &IV);
    assert_eq!(sealed.len(), 16 + (112 + 200) / 16 * 16 + 16);
    assert_eq!(package::Image::open(&sealed, &consts::AES_KEY).unwrap(), image);
}

#[test]
fn open_rejects_partial_blocks() {
    assert_eq!(
        package::Image::open(&[0; 40], &consts::AES_KEY),
        Err(package::Error::NotAPackage(40))
    );
    assert_eq!(
        package::Image::open(&[0; 16], &consts::AES_KEY),
        Err(package::Error::NotAPackage(16))
    );
}

/// A package streamed into the bootloader logic ends up as a bootable image.
#[test]
fn package_installs_on_the_device() {
    let firmware: Vec<u8> = (0..700).map(|i| (i % 251) as u8).collect();
    let image = package::Image::sign(&firmware, 12, consts::DEVICE_ID as u32, &secret(), IV).unwrap();
    let sealed = image.seal(&consts::AES_KEY);

    let mut link = ScriptedLink::new();
    link.feed(&consts::SYNC_SEQUENCE);
    link.feed_packet(&Packet::command(Opcode::UpdateRequest));
    link.feed_packet(&Packet::control(Opcode::FwSizeRequest, &(sealed.len() as u32).to_le_bytes()).unwrap());
    for block in sealed.chunks(16) {
        link.feed_packet(&Packet::data(block).unwrap());
    }

    let config = Config {
        public_key: secret().public_key(&secp256k1::Secp256k1::new()).serialize(),
        layout: Layout {
            app_offset: 0x1000,
            app_size: 0x2000,
        },
        ..Config::default()
    };
    let mut flash = RamFlash::new(0x3000);
    let outcome = update_run(&mut Comm::new(link), &mut flash, &ManualClock::ticking(1), &config);
    assert_eq!(outcome, Outcome::Completed);

    let header = check_image(&mut flash, &config, &Verifier).unwrap();
    assert_eq!(header, image.header);
    assert_eq!(package::Image::parse(&flash.contents()[0x1000..]).unwrap(), image);
}

#[test]
fn test_key_bytes_match_hex() {
    let pubkey = secp256k1::PublicKey::from_slice(&PUBKEY_1_BYTES).unwrap();
    assert_eq!(hex::encode(pubkey.serialize()), PUBKEY_1_HEX);
}

struct Verifier;

impl Secp256k1Verify for Verifier {
    fn verify_ecdsa(&self, msg: [u8; 32], signature: [u8; 64], pubkey: [u8; 33]) -> VerificationResult {
        let (Ok(pubkey), Ok(signature)) = (
            secp256k1::PublicKey::from_slice(&pubkey),
            secp256k1::ecdsa::Signature::from_compact(&signature),
        ) else {
            return VerificationResult::Invalid;
        };
        match secp256k1::Secp256k1::verification_only().verify_ecdsa(
            &secp256k1::Message::from_digest(msg),
            &signature,
            &pubkey,
        ) {
            Ok(()) => VerificationResult::Valid,
            Err(_) => VerificationResult::Invalid,
        }
    }
}

fn secret() -> secp256k1::SecretKey {
    secp256k1::SecretKey::from_slice(&[0x33; 32]).unwrap()
}

/// Files for one signing run.
struct Env {
    input: tempfile::NamedTempFile,
    secret: tempfile::NamedTempFile,
    aes_key: tempfile::NamedTempFile,
    output: tempfile::NamedTempFile,
}

impl Env {
    /// Firmware of `len` bytes behind the header placeholder.
    fn new(len: usize) -> Self {
        let mut input = vec![0; FirmwareHeader::SIZE];
        input.extend((0..len).map(|i| (i * 31) as u8));
        Self {
            input: create_file(&input),
            secret: create_file(SECRET_1_PEM),
            aes_key: create_file(&consts::AES_KEY),
            output: create_file(&[]),
        }
    }

    fn path<'a>(&self, file: &'a tempfile::NamedTempFile) -> &'a str {
        file.path().to_str().unwrap()
    }

    fn output_path(&self) -> String {
        self.path(&self.output).to_owned()
    }

    fn sign(&self, extra: &[&str]) -> Output {
        let output = self.output_path();
        let mut args = vec![
            "sign",
            "--secret",
            self.path(&self.secret),
            "--aes-key",
            self.path(&self.aes_key),
            "-i",
            self.path(&self.input),
            "-o",
            &output,
            "--firmware-version",
            "5",
        ];
        args.extend_from_slice(extra);
        run_test(&args)
    }
}

fn test<const N: usize>(args: [&str; N]) -> Output {
    run_test(&args)
}

fn run_test(args: &[&str]) -> Output {
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let exit_code = crate::main_args(
        std::iter::once("fw-signer").chain(args.iter().copied()),
        &mut stdout,
        &mut stderr,
    );
    println!("* args: {:?}", args);
    println!("* exit_code: {:?}", exit_code);
    println!("* stdout:\n{}", String::from_utf8_lossy(&stdout));
    println!("* stderr:\n{}", String::from_utf8_lossy(&stderr));
    Output {
        exit_code,
        stdout: String::from_utf8(stdout).unwrap(),
        stderr: String::from_utf8(stderr).unwrap(),
    }
}

#[derive(Debug)]
struct Output {
    exit_code: ExitCode,
    stdout: String,
    stderr: String,
}

/// Value of a header row printed by `dump` and `verify`.
fn row<'a>(stdout: &'a str, label: &str) -> &'a str {
    stdout
        .lines()
        .find(|line| line.contains(label))
        .and_then(|line| line.split_whitespace().last())
        .unwrap()
}

fn create_file(data: &[u8]) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(data).unwrap();
    file
}
