/// Returned by [`lookup`] for ports missing from the table.
pub const UNKNOWN_SERVICE: &str = "Unknown";

/// Map a well-known TCP port to a human-readable service name.
pub fn lookup(port: u16) -> &'static str {
    match port {
        20 => "FTP-Data",
        21 => "FTP",
        22 => "SSH",
        23 => "Telnet",
        25 => "SMTP",
        53 => "DNS",
        80 => "HTTP",
        110 => "POP3",
        143 => "IMAP",
        443 => "HTTPS",
        445 => "SMB",
        3306 => "MySQL",
        3389 => "RDP",
        5432 => "PostgreSQL",
        8080 => "HTTP-Proxy",
        _ => UNKNOWN_SERVICE,
    }
}
