// src/banner.rs

/// Prints the application startup banner to the console.
pub fn print_banner() {
    let banner = r#"
       _     _                    _             
__   _(_) __| | ___  ___  _ __ ___| | __ _ _   _ 
\ \ / / |/ _` |/ _ \/ _ \| '__/ _ \ |/ _` | | | |
 \ V /| | (_| |  __/ (_) | | |  __/ | (_| | |_| |
  \_/ |_|\__,_|\___|\___/|_|  \___|_|\__,_|\__, |
                                           |___/ 

    Upload a video, watch the processor's output live
"#;
    println!("{}", banner);
}
