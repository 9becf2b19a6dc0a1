//  ██████╗  █████╗ ███████╗███████╗██╗███╗   ██╗ ██████╗
//  ██╔══██╗██╔══██╗██╔════╝██╔════╝██║████╗  ██║██╔════╝
//  ██████╔╝███████║███████╗███████╗██║██╔██╗ ██║██║  ███╗
//  ██╔═══╝ ██╔══██║╚════██║╚════██║██║██║╚██╗██║██║   ██║
//  ██║     ██║  ██║███████║███████║██║██║ ╚████║╚██████╔╝
//  ╚═╝     ╚═╝  ╚═╝╚══════╝╚══════╝╚═╝╚═╝  ╚═══╝ ╚═════╝

#[cfg(test)]
mod passing {
    use assert_cmd::Command;

    #[test]
    fn prints_help() {
        let mut cmd = Command::cargo_bin(env!("CARGO_PKG_NAME")).unwrap();
        let out = cmd.arg("--help").output().unwrap();

        assert!(out.status.success());
        let stdout = String::from_utf8_lossy(&out.stdout);
        assert!(stdout.contains("--pdf-output"));
        assert!(stdout.contains("--lang-out"));
    }
}

//  ███████╗ █████╗ ██╗██╗     ██╗███╗   ██╗ ██████╗
//  ██╔════╝██╔══██╗██║██║     ██║████╗  ██║██╔════╝
//  █████╗  ███████║██║██║     ██║██╔██╗ ██║██║  ███╗
//  ██╔══╝  ██╔══██║██║██║     ██║██║╚██╗██║██║   ██║
//  ██║     ██║  ██║██║███████╗██║██║ ╚████║╚██████╔╝
//  ╚═╝     ╚═╝  ╚═╝╚═╝╚══════╝╚═╝╚═╝  ╚═══╝ ╚═════╝

#[cfg(test)]
mod failing {
    use std::fs;

    use assert_cmd::Command;

    fn bookbuilder() -> Command {
        let mut cmd = Command::cargo_bin(env!("CARGO_PKG_NAME")).unwrap();
        cmd.env("NO_COLOR", "1");
        cmd
    }

    #[test]
    fn missing_input_directory() {
        let dir = tempfile::tempdir().unwrap();
        let out = bookbuilder()
            .arg("--input")
            .arg(dir.path().join("does-not-exist"))
            .arg("--output")
            .arg(dir.path().join("book.epub"))
            .output()
            .unwrap();

        assert_eq!(out.status.code(), Some(2));
        assert!(!dir.path().join("book.epub").exists());
    }

    #[test]
    fn no_output_requested() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.html"), "<p>text</p>").unwrap();

        let out = bookbuilder()
            .arg("--input")
            .arg(dir.path())
            .output()
            .unwrap();

        assert_eq!(out.status.code(), Some(2));
    }

    #[test]
    fn no_html_pages() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("notes.txt"), "not a page").unwrap();

        let out = bookbuilder()
            .arg("--input")
            .arg(dir.path())
            .arg("--output")
            .arg(dir.path().join("book.epub"))
            .output()
            .unwrap();

        assert_eq!(out.status.code(), Some(1));
        assert!(!dir.path().join("book.epub").exists());
    }

    #[test]
    fn unknown_sort_mode() {
        let dir = tempfile::tempdir().unwrap();
        let out = bookbuilder()
            .arg("--input")
            .arg(dir.path())
            .arg("--output")
            .arg(dir.path().join("book.epub"))
            .arg("--sort")
            .arg("random")
            .output()
            .unwrap();

        assert_eq!(out.status.code(), Some(2));
    }
}
