use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

struct Env {
    home: TempDir,
}

impl Env {
    fn new() -> Self {
        Env {
            home: tempfile::tempdir().unwrap(),
        }
    }

    fn data_dir(&self) -> PathBuf {
        self.home.path().join("dados")
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("residuos").unwrap();
        cmd.env("HOME", self.home.path())
            .env("NO_COLOR", "1")
            .env_remove("RUST_LOG")
            .env_remove("RESIDUOS_USER")
            .env_remove("RESIDUOS_PASSWORD");
        cmd
    }

    fn as_user(&self, user: &str, password: &str) -> Command {
        let mut cmd = self.cmd();
        cmd.env("RESIDUOS_USER", user).env("RESIDUOS_PASSWORD", password);
        cmd
    }

    fn admin(&self) -> Command {
        self.as_user("Administrador", "admin123")
    }

    fn init(&self) {
        self.cmd()
            .args(["init", "--data-dir"])
            .arg(self.data_dir())
            .env("RESIDUOS_PASSWORD", "admin123")
            .assert()
            .success()
            .stdout(predicate::str::contains("Admin user 'Administrador' created."));
    }

    fn add_sample(&self) {
        self.admin()
            .args([
                "records", "add", "--date", "25/01/2024", "--type", "venda", "--regional", "norte", "--branch",
                "filial a", "--destination", "cliente x", "--product", "sucata", "--quantity", "100,5", "--unit",
                "kg", "--unit-price", "1.25",
            ])
            .assert()
            .success()
            .stdout(predicate::str::contains("Record 1 added."));
    }
}

fn write_file(path: &Path, content: &str) {
    std::fs::write(path, content).unwrap();
}

#[test]
fn status_without_database() {
    let env = Env::new();
    env.cmd()
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Database not found"));
}

#[test]
fn commands_need_init() {
    let env = Env::new();
    env.admin()
        .args(["records", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("residuos init"));
}

#[test]
fn add_and_list_record() {
    let env = Env::new();
    env.init();
    env.add_sample();

    env.admin()
        .args(["records", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Norte"))
        .stdout(predicate::str::contains("R$ 125.63"))
        .stdout(predicate::str::contains("Page 1 of 1 (1 records)"));

    env.admin()
        .args(["records", "list", "--search", "NADA"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No records found."));
}

#[test]
fn wrong_password_is_rejected() {
    let env = Env::new();
    env.init();
    env.as_user("Administrador", "errada")
        .args(["records", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Authentication failed"));
}

#[test]
fn non_admin_cannot_delete() {
    let env = Env::new();
    env.init();
    env.add_sample();
    env.admin()
        .args(["users", "add", "operador", "--role", "user", "--new-password", "op123"])
        .assert()
        .success();

    env.as_user("operador", "op123")
        .args(["records", "delete", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Permission denied"));

    env.admin()
        .args(["records", "show", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Sucata"));

    env.admin()
        .args(["log", "--by", "operador"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Tentativa de Exclusão Negada"));
}

#[test]
fn import_reports_rejected_rows() {
    let env = Env::new();
    env.init();
    let src = env.home.path().join("entrada.csv");
    write_file(
        &src,
        "Tipo de Operação,Regional,Filial Remetente,Data,Produto,Destino,Quantidade,Unidade,Preço Unitário\n\
         Venda,norte,filial a,25/01/2024,sucata,cliente,10,kg,2\n\
         Venda,norte,filial a,25/01/2024,,cliente,abc,kg,2\n",
    );
    let errors = env.home.path().join("erros.csv");

    env.admin()
        .args(["import", "run"])
        .arg(&src)
        .arg("--errors")
        .arg(&errors)
        .assert()
        .success()
        .stdout(predicate::str::contains("1 imported, 1 rejected"));

    let report = std::fs::read_to_string(&errors).unwrap();
    assert!(report.starts_with("Linha,"));
    assert!(report.contains("Quantidade inválida"));
    assert!(report.contains("Campo 'Produto' obrigatório não preenchido"));
}

#[test]
fn import_missing_column_aborts() {
    let env = Env::new();
    env.init();
    let src = env.home.path().join("faltando.csv");
    write_file(&src, "Regional,Data\nnorte,25/01/2024\n");

    env.admin()
        .args(["import", "run"])
        .arg(&src)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Missing required columns"))
        .stderr(predicate::str::contains("Produto"));
}

#[test]
fn export_csv_and_dashboard() {
    let env = Env::new();
    env.init();
    env.add_sample();
    let out = env.home.path().join("saida.csv");

    env.admin()
        .args(["export", "--format", "csv", "--output"])
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("1 records exported"));
    let content = std::fs::read_to_string(&out).unwrap();
    assert!(content.starts_with("ID,Data,Tipo de Operação"));
    assert!(content.contains("Sucata"));

    env.admin()
        .args(["dashboard", "--period", "yearly"])
        .assert()
        .success()
        .stdout(predicate::str::contains("R$ 125.63"))
        .stdout(predicate::str::contains("Evolução Anual da Receita"));
}

#[test]
fn delete_all_needs_confirm() {
    let env = Env::new();
    env.init();
    env.add_sample();
    env.admin()
        .args(["records", "delete-all"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--confirm"));
    env.admin()
        .args(["records", "delete-all", "--confirm"])
        .assert()
        .success()
        .stdout(predicate::str::contains("All records deleted (1)."));
}

#[test]
fn completions_print_script() {
    Env::new()
        .cmd()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("residuos"));
}

#[test]
fn edit_rejects_blank_regional() {
    let env = Env::new();
    env.init();
    env.add_sample();
    env.admin()
        .args(["records", "edit", "1", "--regional", ""])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Regional"));
    env.admin()
        .args(["records", "show", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Norte"));
}
